use anyhow::{Context, Result, bail};
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, pkcs1v15, pss};
use sha2::{Digest, Sha256};

use super::signer::ProofSigner;
use crate::request::SignatureScheme;

const RSA_KEY_BITS: usize = 2048;

const SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::RsaPssRsaeSha256,
    SignatureScheme::RsaPkcs1Sha256,
];

/// RSA signer supporting PSS and PKCS#1 v1.5, both with SHA-256.
pub struct RsaSigner {
    pkcs1_key: pkcs1v15::SigningKey<Sha256>,
    pss_key: pss::BlindedSigningKey<Sha256>,
    private_key: RsaPrivateKey,
}

impl RsaSigner {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        let pkcs1_key = pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
        let pss_key = pss::BlindedSigningKey::<Sha256>::new(private_key.clone());
        Self { pkcs1_key, pss_key, private_key }
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| anyhow::anyhow!("invalid RSA PKCS#8 key: {e}"))?;
        Ok(Self::new(private_key))
    }

    /// Development key: the SHA-256 hash of the seed seeds a deterministic
    /// CSPRNG used for RSA key generation.
    pub fn from_seed(seed: &str) -> Result<Self> {
        let hash = Sha256::digest(seed.as_bytes());
        let mut rng = ChaCha20Rng::from_seed(hash.into());
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .context("generating RSA key from seed")?;
        Ok(Self::new(private_key))
    }
}

impl ProofSigner for RsaSigner {
    fn schemes(&self) -> &[SignatureScheme] {
        SCHEMES
    }

    fn sign(&self, scheme: SignatureScheme, message: &[u8]) -> Result<Vec<u8>> {
        match scheme {
            SignatureScheme::RsaPkcs1Sha256 => {
                let signature = self
                    .pkcs1_key
                    .try_sign(message)
                    .map_err(|e| anyhow::anyhow!("rsa pkcs1 sign failed: {e}"))?;
                Ok(signature.to_vec())
            }
            SignatureScheme::RsaPssRsaeSha256 => {
                let signature = self
                    .pss_key
                    .try_sign_with_rng(&mut OsRng, message)
                    .map_err(|e| anyhow::anyhow!("rsa pss sign failed: {e}"))?;
                Ok(signature.to_vec())
            }
            other => bail!("RSA key cannot sign with {}", other.name()),
        }
    }

    fn public_key_der(&self) -> Result<Vec<u8>> {
        let der = self
            .private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| anyhow::anyhow!("encoding RSA public key to DER: {e}"))?;
        Ok(der.into_vec())
    }

    fn name(&self) -> &str {
        "rsa"
    }
}
