use serde::{Deserialize, Serialize};

/// TLS SignatureScheme code points a proof can be produced with.
///
/// Code points this crate cannot sign with are kept as `Unknown` so that a
/// client's preference list survives intact; they never match a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum SignatureScheme {
    RsaPkcs1Sha256,
    EcdsaSecp256r1Sha256,
    RsaPssRsaeSha256,
    Unknown(u16),
}

impl SignatureScheme {
    pub fn code(self) -> u16 {
        match self {
            Self::RsaPkcs1Sha256 => 0x0401,
            Self::EcdsaSecp256r1Sha256 => 0x0403,
            Self::RsaPssRsaeSha256 => 0x0804,
            Self::Unknown(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RsaPkcs1Sha256 => "rsa_pkcs1_sha256",
            Self::EcdsaSecp256r1Sha256 => "ecdsa_secp256r1_sha256",
            Self::RsaPssRsaeSha256 => "rsa_pss_rsae_sha256",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<u16> for SignatureScheme {
    fn from(code: u16) -> Self {
        match code {
            0x0401 => Self::RsaPkcs1Sha256,
            0x0403 => Self::EcdsaSecp256r1Sha256,
            0x0804 => Self::RsaPssRsaeSha256,
            other => Self::Unknown(other),
        }
    }
}

impl From<SignatureScheme> for u16 {
    fn from(scheme: SignatureScheme) -> Self {
        scheme.code()
    }
}

/// Hash the handshake transcript is summarised with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptHash {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl TranscriptHash {
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Reasons a request is rejected before any certificate is selected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("hostname is empty")]
    EmptyHostname,
    #[error("transcript digest is empty")]
    EmptyDigest,
    #[error("transcript digest is {actual} bytes, expected {expected}")]
    DigestLength { expected: usize, actual: usize },
    #[error("no signature scheme offered")]
    NoSchemesOffered,
    #[error("no offered signature scheme is supported by the selected key")]
    NoCommonScheme,
}

/// What the handshake driver asks a proof source to prove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    hostname: String,
    transcript_digest: Vec<u8>,
    schemes: Vec<SignatureScheme>,
    sct_supported: bool,
    expected_leaf_hash: Option<u64>,
}

impl ProofRequest {
    /// `schemes` is in client preference order.
    pub fn new(
        hostname: impl AsRef<str>,
        transcript_digest: impl Into<Vec<u8>>,
        schemes: impl IntoIterator<Item = SignatureScheme>,
    ) -> Self {
        Self {
            hostname: normalize_hostname(hostname.as_ref()),
            transcript_digest: transcript_digest.into(),
            schemes: schemes.into_iter().collect(),
            sct_supported: false,
            expected_leaf_hash: None,
        }
    }

    pub fn with_sct_supported(mut self, sct_supported: bool) -> Self {
        self.sct_supported = sct_supported;
        self
    }

    /// Leaf hash the client cached from an earlier connection, see
    /// [`CertificateChain::leaf_hash`](crate::CertificateChain::leaf_hash).
    pub fn with_expected_leaf_hash(mut self, leaf_hash: u64) -> Self {
        self.expected_leaf_hash = Some(leaf_hash);
        self
    }

    /// Normalised hostname: lowercase, trailing dot removed.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn transcript_digest(&self) -> &[u8] {
        &self.transcript_digest
    }

    pub fn schemes(&self) -> &[SignatureScheme] {
        &self.schemes
    }

    pub fn sct_supported(&self) -> bool {
        self.sct_supported
    }

    pub fn expected_leaf_hash(&self) -> Option<u64> {
        self.expected_leaf_hash
    }

    /// Checks everything that can be checked without a selector.
    pub fn validate(&self, hash: TranscriptHash) -> Result<(), InvalidRequest> {
        if self.hostname.is_empty() {
            return Err(InvalidRequest::EmptyHostname);
        }
        if self.transcript_digest.is_empty() {
            return Err(InvalidRequest::EmptyDigest);
        }
        if self.transcript_digest.len() != hash.digest_len() {
            return Err(InvalidRequest::DigestLength {
                expected: hash.digest_len(),
                actual: self.transcript_digest.len(),
            });
        }
        if self.schemes.is_empty() {
            return Err(InvalidRequest::NoSchemesOffered);
        }
        Ok(())
    }
}

/// Lowercases ASCII and strips a single trailing dot.
pub fn normalize_hostname(hostname: &str) -> String {
    let trimmed = hostname.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> Vec<u8> {
        vec![0xab; 32]
    }

    #[test]
    fn hostname_is_normalized() {
        assert_eq!(normalize_hostname("WWW.Example.COM."), "www.example.com");
        assert_eq!(normalize_hostname("example.com"), "example.com");
        assert_eq!(normalize_hostname("."), "");
        assert_eq!(normalize_hostname(""), "");
    }

    #[test]
    fn valid_request_passes() {
        let request =
            ProofRequest::new("Example.com", digest(), [SignatureScheme::EcdsaSecp256r1Sha256]);
        assert_eq!(request.hostname(), "example.com");
        assert_eq!(request.validate(TranscriptHash::Sha256), Ok(()));
        assert!(!request.sct_supported());
        assert_eq!(request.expected_leaf_hash(), None);
        assert_eq!(request.with_expected_leaf_hash(42).expected_leaf_hash(), Some(42));
    }

    #[test]
    fn empty_hostname_rejected() {
        let request = ProofRequest::new("", digest(), [SignatureScheme::EcdsaSecp256r1Sha256]);
        assert_eq!(request.validate(TranscriptHash::Sha256), Err(InvalidRequest::EmptyHostname));

        let request = ProofRequest::new(".", digest(), [SignatureScheme::EcdsaSecp256r1Sha256]);
        assert_eq!(request.validate(TranscriptHash::Sha256), Err(InvalidRequest::EmptyHostname));
    }

    #[test]
    fn empty_digest_rejected() {
        let request =
            ProofRequest::new("a.com", Vec::new(), [SignatureScheme::EcdsaSecp256r1Sha256]);
        assert_eq!(request.validate(TranscriptHash::Sha256), Err(InvalidRequest::EmptyDigest));
    }

    #[test]
    fn digest_length_must_match_hash() {
        let request = ProofRequest::new("a.com", digest(), [SignatureScheme::EcdsaSecp256r1Sha256]);
        assert_eq!(
            request.validate(TranscriptHash::Sha384),
            Err(InvalidRequest::DigestLength { expected: 48, actual: 32 })
        );
    }

    #[test]
    fn no_schemes_rejected() {
        let request = ProofRequest::new("a.com", digest(), []);
        assert_eq!(request.validate(TranscriptHash::Sha256), Err(InvalidRequest::NoSchemesOffered));
    }

    #[test]
    fn scheme_codes() {
        assert_eq!(SignatureScheme::from(0x0403), SignatureScheme::EcdsaSecp256r1Sha256);
        assert_eq!(SignatureScheme::from(0x0807), SignatureScheme::Unknown(0x0807));
        assert_eq!(u16::from(SignatureScheme::RsaPssRsaeSha256), 0x0804);

        let json = serde_json::to_string(&[SignatureScheme::RsaPkcs1Sha256]).unwrap();
        assert_eq!(json, "[1025]");
    }
}
