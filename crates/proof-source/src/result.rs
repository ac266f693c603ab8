use std::fmt;
use std::time::Instant;

use crate::chain::CertificateChain;
use crate::request::SignatureScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofStatus {
    Success,
    NotFound,
    SigningUnavailable,
    InvalidRequest,
}

impl ProofStatus {
    /// Only a backend fault is worth retrying, and only by the caller.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::SigningUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not-found",
            Self::SigningUnavailable => "signing-unavailable",
            Self::InvalidRequest => "invalid-request",
        }
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy bits the handshake driver acts on alongside the proof.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProofFlags {
    /// Advertise an Expect-CT header for this certificate.
    pub send_expect_ct_header: bool,
    /// False when the default certificate answered instead of a hostname match.
    pub cert_matched_sni: bool,
    /// Whether the served leaf matches the hash the client cached. `None`
    /// when the client sent no hash.
    pub leaf_cert_matches_expected: Option<bool>,
}

/// Material of a successful proof.
#[derive(Debug, Clone)]
pub struct Proof {
    pub chain: CertificateChain,
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
    pub sct_list: Option<Vec<u8>>,
    pub flags: ProofFlags,
}

/// Outcome of one `get_proof` call.
///
/// A chain and signature are present exactly when the status is
/// [`ProofStatus::Success`]; the constructors are the only way to build one.
#[derive(Debug, Clone)]
pub struct ProofResult {
    status: ProofStatus,
    proof: Option<Proof>,
    signed_at: Option<Instant>,
}

impl ProofResult {
    pub fn success(proof: Proof) -> Self {
        debug_assert!(!proof.chain.is_empty(), "successful proof with an empty chain");
        debug_assert!(!proof.signature.is_empty(), "successful proof with an empty signature");
        Self {
            status: ProofStatus::Success,
            proof: Some(proof),
            signed_at: Some(Instant::now()),
        }
    }

    /// `status` must not be [`ProofStatus::Success`]; a success without a
    /// proof is reported as `SigningUnavailable`.
    pub fn failure(status: ProofStatus) -> Self {
        let status = match status {
            ProofStatus::Success => {
                debug_assert!(false, "ProofResult::failure called with Success");
                ProofStatus::SigningUnavailable
            }
            other => other,
        };
        Self {
            status,
            proof: None,
            signed_at: None,
        }
    }

    pub fn status(&self) -> ProofStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ProofStatus::Success
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn into_proof(self) -> Option<Proof> {
        self.proof
    }

    pub fn chain(&self) -> Option<&CertificateChain> {
        self.proof.as_ref().map(|p| &p.chain)
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.proof.as_ref().map(|p| p.signature.as_slice())
    }

    pub fn scheme(&self) -> Option<SignatureScheme> {
        self.proof.as_ref().map(|p| p.scheme)
    }

    pub fn sct_list(&self) -> Option<&[u8]> {
        self.proof.as_ref().and_then(|p| p.sct_list.as_deref())
    }

    pub fn flags(&self) -> ProofFlags {
        self.proof.as_ref().map(|p| p.flags).unwrap_or_default()
    }

    /// Monotonic time the signature was produced, for staleness policy.
    pub fn signed_at(&self) -> Option<Instant> {
        self.signed_at
    }
}
