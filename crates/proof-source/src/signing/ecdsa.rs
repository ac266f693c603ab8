use anyhow::{Result, bail};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer};
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
use sha2::{Digest, Sha256};

use super::signer::ProofSigner;
use crate::request::SignatureScheme;

const SCHEMES: &[SignatureScheme] = &[SignatureScheme::EcdsaSecp256r1Sha256];

/// ECDSA signer on the NIST P-256 curve with SHA-256.
///
/// Signatures are DER encoded, as TLS carries them.
pub struct EcdsaP256Signer {
    signing_key: SigningKey,
}

impl EcdsaP256Signer {
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_pkcs8_der(der)
            .map_err(|e| anyhow::anyhow!("invalid P-256 PKCS#8 key: {e}"))?;
        Ok(Self { signing_key })
    }

    /// Development key: the SHA-256 hash of the seed becomes the scalar.
    pub fn from_seed(seed: &str) -> Result<Self> {
        let hash = Sha256::digest(seed.as_bytes());
        let signing_key = SigningKey::from_bytes((&hash).into())
            .map_err(|e| anyhow::anyhow!("invalid seed: {e}"))?;
        Ok(Self { signing_key })
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl ProofSigner for EcdsaP256Signer {
    fn schemes(&self) -> &[SignatureScheme] {
        SCHEMES
    }

    fn sign(&self, scheme: SignatureScheme, message: &[u8]) -> Result<Vec<u8>> {
        if scheme != SignatureScheme::EcdsaSecp256r1Sha256 {
            bail!("P-256 key cannot sign with {}", scheme.name());
        }
        let signature: Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| anyhow::anyhow!("p256 sign failed: {e}"))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn public_key_der(&self) -> Result<Vec<u8>> {
        let der = self
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| anyhow::anyhow!("encoding P-256 public key: {e}"))?;
        Ok(der.into_vec())
    }

    fn name(&self) -> &str {
        "ecdsa-p256"
    }
}
