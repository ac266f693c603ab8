#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use rand::Rng;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use quic_proof_source::signing::certificate_verify_message;
use quic_proof_source::source::StatsSnapshot;
use quic_proof_source::{
    CertificateChain, EcdsaP256Signer, ProofConsumer, ProofResult, RequestId, SelectorEntry,
    SignatureScheme, SigningBackend,
};

pub const P256: SignatureScheme = SignatureScheme::EcdsaSecp256r1Sha256;

pub fn digest(seed: u8) -> Vec<u8> {
    vec![seed; 32]
}

pub struct TestCert {
    pub chain: CertificateChain,
    pub chain_pem: String,
    pub key_der: Vec<u8>,
    pub key_pem: String,
}

/// Self-signed P-256 certificate for `hosts` with its matching key.
pub fn test_cert(hosts: &[&str]) -> TestCert {
    let names: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names).unwrap();
    TestCert {
        chain: CertificateChain::new(vec![cert.der().to_vec()]),
        chain_pem: cert.pem(),
        key_der: key_pair.serialize_der(),
        key_pem: key_pair.serialize_pem(),
    }
}

pub fn cert_entry(cert: &TestCert) -> SelectorEntry {
    let signer = EcdsaP256Signer::from_pkcs8_der(&cert.key_der).unwrap();
    SelectorEntry::from_signer(cert.chain.clone(), signer).unwrap()
}

/// Checks the signature against the leaf certificate's public key.
pub fn assert_proof_verifies(result: &ProofResult, digest: &[u8]) {
    assert_eq!(result.scheme(), Some(P256));
    let chain = result.chain().expect("successful result carries a chain");
    assert!(!chain.is_empty());

    let (_, leaf) = x509_parser::parse_x509_certificate(chain.leaf().unwrap()).unwrap();
    let key = VerifyingKey::from_public_key_der(leaf.public_key().raw).unwrap();
    let signature = Signature::from_der(result.signature().unwrap()).unwrap();
    key.verify(&certificate_verify_message(digest), &signature)
        .expect("signature should verify under the leaf key");
}

/// Backend whose signatures are `tag || message`, after an optional random delay.
pub struct EchoBackend {
    pub tag: Vec<u8>,
    pub max_delay_ms: u64,
}

impl EchoBackend {
    pub fn new(tag: impl Into<Vec<u8>>) -> Self {
        Self { tag: tag.into(), max_delay_ms: 0 }
    }

    pub fn with_random_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

impl SigningBackend for EchoBackend {
    fn schemes(&self) -> &[SignatureScheme] {
        &[P256]
    }

    fn sign(
        &self,
        _: SignatureScheme,
        message: Vec<u8>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let delay = if self.max_delay_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_delay_ms)
        };
        let mut signature = self.tag.clone();
        async move {
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            signature.extend_from_slice(&message);
            Ok(signature)
        }
        .boxed()
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Holds every signature until [`Gate::open`] is called.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn backend(&self, inner: impl SigningBackend + 'static) -> GatedBackend {
        GatedBackend {
            rx: self.tx.subscribe(),
            inner: Box::new(inner),
        }
    }
}

pub struct GatedBackend {
    rx: watch::Receiver<bool>,
    inner: Box<dyn SigningBackend>,
}

impl SigningBackend for GatedBackend {
    fn schemes(&self) -> &[SignatureScheme] {
        self.inner.schemes()
    }

    fn sign(
        &self,
        scheme: SignatureScheme,
        message: Vec<u8>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let mut rx = self.rx.clone();
        let signing = self.inner.sign(scheme, message);
        async move {
            if rx.wait_for(|open| *open).await.is_err() {
                anyhow::bail!("gate dropped before opening");
            }
            signing.await
        }
        .boxed()
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Counts `sign` calls before handing them to the inner backend.
pub struct CountingBackend {
    calls: Arc<AtomicUsize>,
    inner: Box<dyn SigningBackend>,
}

impl CountingBackend {
    pub fn new(inner: impl SigningBackend + 'static) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            inner: Box::new(inner),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl SigningBackend for CountingBackend {
    fn schemes(&self) -> &[SignatureScheme] {
        self.inner.schemes()
    }

    fn sign(
        &self,
        scheme: SignatureScheme,
        message: Vec<u8>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(scheme, message)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub struct FailingBackend;

impl SigningBackend for FailingBackend {
    fn schemes(&self) -> &[SignatureScheme] {
        &[P256]
    }

    fn sign(&self, _: SignatureScheme, _: Vec<u8>) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        async { Err(anyhow::anyhow!("hsm unreachable")) }.boxed()
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub struct PanickingBackend;

impl SigningBackend for PanickingBackend {
    fn schemes(&self) -> &[SignatureScheme] {
        &[P256]
    }

    fn sign(&self, _: SignatureScheme, _: Vec<u8>) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        async { panic!("signing backend crashed") }.boxed()
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

pub fn echo_entry(leaf: &str, backend: impl SigningBackend + 'static) -> SelectorEntry {
    let chain = CertificateChain::new(vec![leaf.as_bytes().to_vec()]);
    SelectorEntry::new(chain, Arc::new(backend)).unwrap()
}

/// Stand-in for a handshake context: forwards results to a channel and
/// counts invocations in a counter that outlives it.
pub struct TestHandshake {
    tx: mpsc::UnboundedSender<(RequestId, ProofResult)>,
    pub calls: Arc<AtomicUsize>,
}

impl TestHandshake {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(RequestId, ProofResult)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handshake = Arc::new(Self {
            tx,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        (handshake, rx)
    }
}

impl ProofConsumer for TestHandshake {
    fn on_proof(&self, id: RequestId, result: ProofResult) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send((id, result));
    }
}

/// Polls `snapshot` until `settled` results have been recorded.
pub async fn wait_settled(snapshot: impl Fn() -> StatsSnapshot, settled: u64) -> StatsSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let stats = snapshot();
            if stats.settled() >= settled {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("proof source did not settle in time")
}

/// Scratch directory removed when the returned guard drops.
pub fn scratch_dir(name: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("quic-proof-source-{name}-"))
        .tempdir()
        .unwrap()
}
