//! Hostname to certificate/key selection.
//!
//! Lookup order for a normalised hostname:
//!
//! 1. an exact name,
//! 2. the most specific matching wildcard (`*.b.example.com` beats
//!    `*.example.com`); among equally specific wildcards the one declared
//!    first wins,
//! 3. the default entry, if one is configured.
//!
//! A [`SelectorTable`] is immutable. [`CertificateSelector`] swaps whole
//! tables on reload, so a lookup always sees one consistent snapshot.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;
use x509_parser::prelude::*;

use crate::chain::CertificateChain;
use crate::error::SelectorError;
use crate::request::{SignatureScheme, normalize_hostname};
use crate::signing::{BlockingBackend, ProofSigner, SigningBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    /// `*.suffix`: any name ending in `.suffix` with at least one more label.
    Wildcard { suffix: String, labels: usize },
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Result<Self, SelectorError> {
        let normalized = normalize_hostname(pattern);
        let invalid = || SelectorError::InvalidPattern(pattern.to_string());

        if normalized.is_empty() || normalized.split('.').any(str::is_empty) {
            return Err(invalid());
        }
        match normalized.strip_prefix("*.") {
            Some(suffix) => {
                if suffix.contains('*') {
                    return Err(invalid());
                }
                Ok(Self::Wildcard {
                    labels: suffix.split('.').count(),
                    suffix: suffix.to_string(),
                })
            }
            None if normalized.contains('*') => Err(invalid()),
            None => Ok(Self::Exact(normalized)),
        }
    }

    /// Label count of the fixed part; an exact name outranks any wildcard.
    pub fn specificity(&self) -> usize {
        match self {
            Self::Exact(_) => usize::MAX,
            Self::Wildcard { labels, .. } => *labels,
        }
    }

    pub fn matches(&self, hostname: &str) -> bool {
        match self {
            Self::Exact(name) => name == hostname,
            Self::Wildcard { suffix, .. } => hostname
                .strip_suffix(suffix.as_str())
                .and_then(|prefix| prefix.strip_suffix('.'))
                .is_some_and(|prefix| !prefix.is_empty()),
        }
    }
}

/// A certificate chain and the key that proves ownership of it.
pub struct SelectorEntry {
    chain: CertificateChain,
    backend: Arc<dyn SigningBackend>,
    sct_list: Option<Arc<[u8]>>,
    send_expect_ct_header: bool,
}

impl SelectorEntry {
    pub fn new(
        chain: CertificateChain,
        backend: Arc<dyn SigningBackend>,
    ) -> Result<Self, SelectorError> {
        if chain.is_empty() {
            return Err(SelectorError::EmptyChain);
        }
        if backend.schemes().is_empty() {
            return Err(SelectorError::NoSchemes);
        }
        Ok(Self {
            chain,
            backend,
            sct_list: None,
            send_expect_ct_header: false,
        })
    }

    /// Builds an entry around a local signer, checking that the leaf
    /// certificate carries the signer's public key.
    pub fn from_signer<S>(chain: CertificateChain, signer: S) -> Result<Self, SelectorError>
    where
        S: ProofSigner + 'static,
    {
        let leaf = chain.leaf().ok_or(SelectorError::EmptyChain)?;
        let key_der = signer
            .public_key_der()
            .map_err(|e| SelectorError::PublicKey(e.to_string()))?;
        check_leaf_key(leaf, &key_der)?;
        Self::new(chain, Arc::new(BlockingBackend::new(signer)))
    }

    pub fn with_sct_list(mut self, sct_list: Vec<u8>) -> Self {
        self.sct_list = (!sct_list.is_empty()).then(|| sct_list.into());
        self
    }

    pub fn with_expect_ct_header(mut self, send: bool) -> Self {
        self.send_expect_ct_header = send;
        self
    }

    pub fn chain(&self) -> &CertificateChain {
        &self.chain
    }

    pub fn backend(&self) -> &Arc<dyn SigningBackend> {
        &self.backend
    }

    pub fn schemes(&self) -> &[SignatureScheme] {
        self.backend.schemes()
    }

    pub fn sct_list(&self) -> Option<&[u8]> {
        self.sct_list.as_deref()
    }

    pub fn send_expect_ct_header(&self) -> bool {
        self.send_expect_ct_header
    }
}

impl std::fmt::Debug for SelectorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorEntry")
            .field("chain", &self.chain)
            .field("backend", &self.backend.name())
            .field("sct_list", &self.sct_list.as_ref().map(|s| s.len()))
            .field("send_expect_ct_header", &self.send_expect_ct_header)
            .finish()
    }
}

fn check_leaf_key(leaf: &[u8], key_der: &[u8]) -> Result<(), SelectorError> {
    let (_, cert) = parse_x509_certificate(leaf)
        .map_err(|e| SelectorError::CertificateParse(e.to_string()))?;
    let (_, key) = SubjectPublicKeyInfo::from_der(key_der)
        .map_err(|e| SelectorError::PublicKey(e.to_string()))?;

    let leaf_key = cert.public_key();
    if leaf_key.algorithm.algorithm != key.algorithm.algorithm
        || leaf_key.subject_public_key.data != key.subject_public_key.data
    {
        return Err(SelectorError::KeyMismatch);
    }
    Ok(())
}

/// The entry chosen for a hostname.
#[derive(Debug, Clone)]
pub struct Selection {
    pub entry: Arc<SelectorEntry>,
    /// False when the default entry answered.
    pub matched_sni: bool,
}

/// One immutable configuration snapshot.
#[derive(Debug, Default)]
pub struct SelectorTable {
    exact: HashMap<String, Arc<SelectorEntry>>,
    wildcards: Vec<(HostPattern, Arc<SelectorEntry>)>,
    default: Option<Arc<SelectorEntry>>,
    entries: usize,
}

impl SelectorTable {
    pub fn builder() -> SelectorTableBuilder {
        SelectorTableBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of entries, the default included.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn select(&self, hostname: &str) -> Option<Selection> {
        let hostname = normalize_hostname(hostname);
        if hostname.is_empty() {
            return None;
        }

        if let Some(entry) = self.exact.get(&hostname) {
            return Some(Selection { entry: Arc::clone(entry), matched_sni: true });
        }

        let mut best: Option<(usize, &Arc<SelectorEntry>)> = None;
        for (pattern, entry) in &self.wildcards {
            if !pattern.matches(&hostname) {
                continue;
            }
            let specificity = pattern.specificity();
            // Strictly greater, so the first declaration wins a tie.
            if best.is_none_or(|(best_specificity, _)| specificity > best_specificity) {
                best = Some((specificity, entry));
            }
        }
        if let Some((_, entry)) = best {
            return Some(Selection { entry: Arc::clone(entry), matched_sni: true });
        }

        self.default
            .as_ref()
            .map(|entry| Selection { entry: Arc::clone(entry), matched_sni: false })
    }
}

#[derive(Debug, Default)]
pub struct SelectorTableBuilder {
    table: SelectorTable,
}

impl SelectorTableBuilder {
    /// Adds `entry` under every pattern in `patterns`. Declaration order is
    /// kept: a name or wildcard declared earlier wins over a later duplicate.
    pub fn add<I, P>(mut self, patterns: I, entry: SelectorEntry) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| HostPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(SelectorError::NoPatterns);
        }

        let entry = Arc::new(entry);
        for pattern in patterns {
            match pattern {
                HostPattern::Exact(name) => {
                    if let Entry::Vacant(slot) = self.table.exact.entry(name) {
                        slot.insert(Arc::clone(&entry));
                    }
                }
                wildcard @ HostPattern::Wildcard { .. } => {
                    self.table.wildcards.push((wildcard, Arc::clone(&entry)));
                }
            }
        }
        self.table.entries += 1;
        Ok(self)
    }

    pub fn default_entry(mut self, entry: SelectorEntry) -> Self {
        if self.table.default.is_none() {
            self.table.entries += 1;
        }
        self.table.default = Some(Arc::new(entry));
        self
    }

    pub fn build(self) -> SelectorTable {
        self.table
    }
}

/// Holds the live [`SelectorTable`] and replaces it wholesale on reload.
pub struct CertificateSelector {
    table: ArcSwap<SelectorTable>,
}

impl CertificateSelector {
    pub fn new(table: SelectorTable) -> Self {
        Self { table: ArcSwap::from_pointee(table) }
    }

    pub fn snapshot(&self) -> Arc<SelectorTable> {
        self.table.load_full()
    }

    /// Readers holding the previous snapshot keep it until they finish.
    pub fn reload(&self, table: SelectorTable) {
        let entries = table.len();
        self.table.store(Arc::new(table));
        info!(entries, "certificate selector reloaded");
    }

    pub fn select(&self, hostname: &str) -> Option<Selection> {
        self.table.load().select(hostname)
    }
}

impl std::fmt::Debug for CertificateSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSelector")
            .field("entries", &self.table.load().len())
            .finish()
    }
}
