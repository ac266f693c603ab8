use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use serde::Deserialize;
use tracing::info;

use crate::chain::CertificateChain;
use crate::error::ConfigError;
use crate::request::TranscriptHash;
use crate::selector::{CertificateSelector, SelectorEntry, SelectorTable};
use crate::signing::{EcdsaP256Signer, RsaSigner};
use crate::source::ProofSourceOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    #[default]
    EcdsaP256,
    Rsa,
}

/// One certificate chain and its key, as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    /// PEM file with the leaf first, then intermediates.
    pub chain: PathBuf,
    /// PEM PKCS#8 private key.
    pub key: PathBuf,
    #[serde(default)]
    pub key_type: KeyType,
    /// Raw TLS SignedCertificateTimestampList.
    #[serde(default)]
    pub sct_list: Option<PathBuf>,
    #[serde(default)]
    pub send_expect_ct_header: bool,
}

/// Configuration file of the proof source.
///
/// Relative paths are resolved against the directory of the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofSourceConfig {
    #[serde(default)]
    pub transcript_hash: TranscriptHash,
    #[serde(default = "default_serve_scts")]
    pub serve_scts: bool,
    #[serde(default)]
    pub certificates: Vec<CertificateConfig>,
    #[serde(default)]
    pub default: Option<CertificateConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_serve_scts() -> bool {
    true
}

impl ProofSourceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&json, base_dir)
    }

    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn options(&self) -> ProofSourceOptions {
        ProofSourceOptions {
            transcript_hash: self.transcript_hash,
            serve_scts: self.serve_scts,
        }
    }

    /// Reads every chain and key and builds a selector snapshot.
    pub fn build_table(&self) -> Result<SelectorTable, ConfigError> {
        let mut builder = SelectorTable::builder();
        for cert in &self.certificates {
            let entry = self.load_entry(cert)?;
            builder = builder
                .add(&cert.hosts, entry)
                .map_err(|source| ConfigError::Entry {
                    hosts: cert.hosts.clone(),
                    source,
                })?;
        }
        if let Some(cert) = &self.default {
            builder = builder.default_entry(self.load_entry(cert)?);
        }
        Ok(builder.build())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn load_entry(&self, cert: &CertificateConfig) -> Result<SelectorEntry, ConfigError> {
        let chain = read_chain(&self.resolve(&cert.chain))?;
        let key_path = self.resolve(&cert.key);
        let key = read_pkcs8_key(&key_path)?;
        let key_error = |source: anyhow::Error| ConfigError::Key {
            path: key_path.clone(),
            source,
        };

        let entry = match cert.key_type {
            KeyType::EcdsaP256 => {
                let signer =
                    EcdsaP256Signer::from_pkcs8_der(key.secret_pkcs8_der()).map_err(key_error)?;
                SelectorEntry::from_signer(chain, signer)
            }
            KeyType::Rsa => {
                let signer = RsaSigner::from_pkcs8_der(key.secret_pkcs8_der()).map_err(key_error)?;
                SelectorEntry::from_signer(chain, signer)
            }
        }
        .map_err(|source| ConfigError::Entry {
            hosts: cert.hosts.clone(),
            source,
        })?;

        let entry = match &cert.sct_list {
            Some(path) => entry.with_sct_list(read_file(&self.resolve(path))?),
            None => entry,
        };
        Ok(entry.with_expect_ct_header(cert.send_expect_ct_header))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_chain(path: &Path) -> Result<CertificateChain, ConfigError> {
    let pem = read_file(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .map(|cert| cert.map(|der| der.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Pem {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(ConfigError::NoCertificates(path.to_path_buf()));
    }
    Ok(CertificateChain::new(certs))
}

fn read_pkcs8_key(path: &Path) -> Result<PrivatePkcs8KeyDer<'static>, ConfigError> {
    let pem = read_file(path)?;
    PrivatePkcs8KeyDer::from_pem_slice(&pem).map_err(|e| ConfigError::Pem {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Re-reads the configuration file into a live selector.
///
/// Only the certificate table is replaced; `transcript_hash` and
/// `serve_scts` keep the values the source was started with.
#[derive(Debug)]
pub struct ConfigReloader {
    path: PathBuf,
    selector: Arc<CertificateSelector>,
}

impl ConfigReloader {
    pub fn new(path: impl Into<PathBuf>, selector: Arc<CertificateSelector>) -> Self {
        Self {
            path: path.into(),
            selector,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On error the current snapshot stays in place.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let table = ProofSourceConfig::from_file(&self.path)?.build_table()?;
        let entries = table.len();
        self.selector.reload(table);
        info!(path = %self.path.display(), entries, "configuration reloaded");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = ProofSourceConfig::from_json("{}", ".").unwrap();
        assert_eq!(config.transcript_hash, TranscriptHash::Sha256);
        assert!(config.serve_scts);
        assert!(config.certificates.is_empty());
        assert!(config.default.is_none());
        assert!(config.build_table().unwrap().is_empty());
    }

    #[test]
    fn parses_certificate_entries() {
        let json = r#"{
            "transcript_hash": "sha384",
            "serve_scts": false,
            "certificates": [
                {"hosts": ["a.example.com", "*.example.org"], "chain": "a.pem", "key": "a.key",
                 "key_type": "rsa", "sct_list": "a.sct", "send_expect_ct_header": true}
            ],
            "default": {"chain": "d.pem", "key": "d.key"}
        }"#;
        let config = ProofSourceConfig::from_json(json, "/etc/proof").unwrap();
        assert_eq!(config.options().transcript_hash, TranscriptHash::Sha384);
        assert!(!config.options().serve_scts);

        let cert = &config.certificates[0];
        assert_eq!(cert.hosts, vec!["a.example.com", "*.example.org"]);
        assert_eq!(cert.key_type, KeyType::Rsa);
        assert!(cert.send_expect_ct_header);
        assert_eq!(config.resolve(&cert.chain), PathBuf::from("/etc/proof/a.pem"));

        let default = config.default.as_ref().unwrap();
        assert_eq!(default.key_type, KeyType::EcdsaP256);
        assert!(default.sct_list.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = ProofSourceConfig::from_json(r#"{"certificate": []}"#, ".");
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let json = r#"{"certificates": [
            {"hosts": ["a.com"], "chain": "missing.pem", "key": "missing.key"}
        ]}"#;
        let config = ProofSourceConfig::from_json(json, "/nonexistent").unwrap();
        assert!(matches!(config.build_table(), Err(ConfigError::Io { .. })));
    }
}
