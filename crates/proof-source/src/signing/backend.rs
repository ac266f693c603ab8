use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::signer::ProofSigner;
use crate::request::SignatureScheme;

/// Where signatures actually get made: a local key, an HSM, a remote KMS.
///
/// `sign` must not block the caller; it returns a future that may resolve
/// on any thread. The proof source never retries a failed future.
pub trait SigningBackend: Send + Sync {
    fn schemes(&self) -> &[SignatureScheme];

    fn sign(
        &self,
        scheme: SignatureScheme,
        message: Vec<u8>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<u8>>>;

    fn name(&self) -> &str;
}

/// Runs a CPU-bound [`ProofSigner`] on the blocking thread pool.
pub struct BlockingBackend<S> {
    signer: Arc<S>,
}

impl<S: ProofSigner + 'static> BlockingBackend<S> {
    pub fn new(signer: S) -> Self {
        Self { signer: Arc::new(signer) }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }
}

impl<S: ProofSigner + 'static> SigningBackend for BlockingBackend<S> {
    fn schemes(&self) -> &[SignatureScheme] {
        self.signer.schemes()
    }

    fn sign(
        &self,
        scheme: SignatureScheme,
        message: Vec<u8>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let signer = Arc::clone(&self.signer);
        async move {
            tokio::task::spawn_blocking(move || signer.sign(scheme, &message))
                .await
                .context("signing task did not complete")?
        }
        .boxed()
    }

    fn name(&self) -> &str {
        self.signer.name()
    }
}
