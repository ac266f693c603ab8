mod signer;
mod ecdsa;
mod rsa;
mod backend;

pub use signer::{ProofSigner, certificate_verify_message};
pub use ecdsa::EcdsaP256Signer;
pub use self::rsa::RsaSigner;
pub use backend::{BlockingBackend, SigningBackend};
