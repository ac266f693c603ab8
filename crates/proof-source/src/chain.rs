use std::sync::Arc;

const FNV1A_64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A_64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// An ordered, immutable list of DER certificates, leaf first.
///
/// Cloning is cheap: every clone shares the same allocation, so a chain
/// selected for one request can outlive the selector table it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Arc<[Vec<u8>]>,
}

impl CertificateChain {
    pub fn new(certs: Vec<Vec<u8>>) -> Self {
        Self { certs: certs.into() }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn leaf(&self) -> Option<&[u8]> {
        self.certs.first().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.certs.iter().map(Vec::as_slice)
    }

    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certs
    }

    /// 64-bit FNV-1a hash of the leaf certificate.
    ///
    /// Clients that cached a server's leaf from an earlier connection send
    /// this hash back; see [`CertificateChain::matches_leaf_hash`].
    pub fn leaf_hash(&self) -> Option<u64> {
        self.leaf().map(fnv1a_64)
    }

    pub fn matches_leaf_hash(&self, expected: u64) -> bool {
        self.leaf_hash() == Some(expected)
    }

    /// Whether two handles point at the same shared allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.certs, &other.certs)
    }
}

impl std::fmt::Debug for CertificateChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateChain")
            .field("len", &self.len())
            .field("leaf_hash", &self.leaf_hash().map(|h| format!("{h:016x}")))
            .finish()
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV1A_64_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV1A_64_PRIME)
    })
}
