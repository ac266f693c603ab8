pub mod chain;
pub mod config;
pub mod error;
pub mod negotiate;
pub mod request;
pub mod result;
pub mod selector;
pub mod server;
pub mod signing;
pub mod sink;
pub mod source;

pub use chain::CertificateChain;
pub use config::{ConfigReloader, ProofSourceConfig};
pub use error::{ConfigError, ProofServerError, SelectorError};
pub use request::{InvalidRequest, ProofRequest, SignatureScheme, TranscriptHash};
pub use result::{Proof, ProofFlags, ProofResult, ProofStatus};
pub use selector::{CertificateSelector, SelectorEntry, SelectorTable};
pub use server::{AppState, router, run};
pub use signing::{BlockingBackend, EcdsaP256Signer, ProofSigner, RsaSigner, SigningBackend};
pub use sink::{Delivery, ProofCompletionSink, ProofConsumer, ProofReceiver, RequestId};
pub use source::{FailClosedProofSource, ProofSource, ProofSourceOptions, SelectorProofSource};
