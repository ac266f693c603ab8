use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::negotiate::negotiate_scheme;
use crate::request::{InvalidRequest, ProofRequest, TranscriptHash};
use crate::result::{Proof, ProofFlags, ProofResult, ProofStatus};
use crate::selector::CertificateSelector;
use crate::signing::certificate_verify_message;
use crate::sink::{Delivery, ProofCompletionSink};

/// Produces proofs of identity for the handshake driver.
///
/// `get_proof` never blocks. It may settle `sink` before returning or later
/// from another thread; callers must handle both. Every failure is reported
/// through the sink as a [`ProofStatus`], never by panicking or returning.
pub trait ProofSource: Send + Sync {
    fn get_proof(&self, request: ProofRequest, sink: ProofCompletionSink);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofSourceOptions {
    /// Transcript digests must be this hash's length.
    pub transcript_hash: TranscriptHash,
    /// Attach SCT lists for clients that advertise support.
    pub serve_scts: bool,
}

impl Default for ProofSourceOptions {
    fn default() -> Self {
        Self {
            transcript_hash: TranscriptHash::Sha256,
            serve_scts: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProofSourceStats {
    requests: AtomicU64,
    successes: AtomicU64,
    not_found: AtomicU64,
    signing_unavailable: AtomicU64,
    invalid_requests: AtomicU64,
    discarded: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub not_found: u64,
    pub signing_unavailable: u64,
    pub invalid_requests: u64,
    /// Results dropped because the handshake context was gone.
    pub discarded: u64,
    /// Requests abandoned before signing because the context was gone.
    pub cancelled: u64,
}

impl StatsSnapshot {
    pub fn settled(&self) -> u64 {
        self.successes
            + self.not_found
            + self.signing_unavailable
            + self.invalid_requests
            + self.cancelled
    }
}

impl ProofSourceStats {
    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, status: ProofStatus, delivery: Delivery) {
        let counter = match status {
            ProofStatus::Success => &self.successes,
            ProofStatus::NotFound => &self.not_found,
            ProofStatus::SigningUnavailable => &self.signing_unavailable,
            ProofStatus::InvalidRequest => &self.invalid_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if delivery == Delivery::Discarded {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            signing_unavailable: self.signing_unavailable.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

fn settle(stats: &ProofSourceStats, sink: ProofCompletionSink, result: ProofResult) {
    let status = result.status();
    let delivery = sink.deliver(result);
    stats.record(status, delivery);
}

/// A sink waiting on a signing task.
///
/// If the task is dropped before finishing (backend panic, runtime shutdown)
/// the sink is settled with `signing-unavailable` and counted.
struct PendingProof {
    sink: Option<ProofCompletionSink>,
    stats: Arc<ProofSourceStats>,
}

impl PendingProof {
    fn new(sink: ProofCompletionSink, stats: Arc<ProofSourceStats>) -> Self {
        Self {
            sink: Some(sink),
            stats,
        }
    }

    fn finish(mut self, result: ProofResult) {
        if let Some(sink) = self.sink.take() {
            settle(&self.stats, sink, result);
        }
    }
}

impl Drop for PendingProof {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!(request = %sink.id(), "signing task ended without a result");
            settle(&self.stats, sink, ProofResult::failure(ProofStatus::SigningUnavailable));
        }
    }
}

/// Proof source backed by a [`CertificateSelector`].
///
/// Validation, selection and algorithm negotiation happen on the calling
/// thread and fail synchronously. Signing is handed to the entry's backend
/// and completes on `runtime`.
pub struct SelectorProofSource {
    selector: Arc<CertificateSelector>,
    options: ProofSourceOptions,
    stats: Arc<ProofSourceStats>,
    runtime: Handle,
}

impl SelectorProofSource {
    pub fn new(
        selector: Arc<CertificateSelector>,
        options: ProofSourceOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            selector,
            options,
            stats: Arc::default(),
            runtime,
        }
    }

    pub fn selector(&self) -> &Arc<CertificateSelector> {
        &self.selector
    }

    pub fn options(&self) -> ProofSourceOptions {
        self.options
    }

    pub fn stats(&self) -> &Arc<ProofSourceStats> {
        &self.stats
    }

    fn reject(&self, request: &ProofRequest, sink: ProofCompletionSink, reason: InvalidRequest) {
        debug!(
            request = %sink.id(),
            hostname = request.hostname(),
            %reason,
            "proof request rejected"
        );
        settle(&self.stats, sink, ProofResult::failure(ProofStatus::InvalidRequest));
    }
}

impl ProofSource for SelectorProofSource {
    fn get_proof(&self, request: ProofRequest, sink: ProofCompletionSink) {
        self.stats.record_request();

        if let Err(reason) = request.validate(self.options.transcript_hash) {
            return self.reject(&request, sink, reason);
        }

        let Some(selection) = self.selector.select(request.hostname()) else {
            info!(
                request = %sink.id(),
                hostname = request.hostname(),
                "no certificate for hostname"
            );
            return settle(&self.stats, sink, ProofResult::failure(ProofStatus::NotFound));
        };
        let entry = selection.entry;

        let Some(scheme) = negotiate_scheme(request.schemes(), entry.schemes()) else {
            return self.reject(&request, sink, InvalidRequest::NoCommonScheme);
        };

        if !sink.is_live() {
            debug!(request = %sink.id(), "handshake context gone before signing");
            sink.deliver(ProofResult::failure(ProofStatus::SigningUnavailable));
            return self.stats.record_cancelled();
        }

        let sct_list = if self.options.serve_scts && request.sct_supported() {
            entry.sct_list().map(<[u8]>::to_vec)
        } else {
            None
        };
        let flags = ProofFlags {
            send_expect_ct_header: entry.send_expect_ct_header(),
            cert_matched_sni: selection.matched_sni,
            leaf_cert_matches_expected: request
                .expected_leaf_hash()
                .map(|hash| entry.chain().matches_leaf_hash(hash)),
        };

        let signing = entry
            .backend()
            .sign(scheme, certificate_verify_message(request.transcript_digest()));
        let chain = entry.chain().clone();
        let backend = entry.backend().name().to_string();
        let hostname = request.hostname().to_string();
        let id = sink.id();
        let pending = PendingProof::new(sink, Arc::clone(&self.stats));

        self.runtime.spawn(async move {
            let result = match signing.await {
                Ok(signature) if !signature.is_empty() => ProofResult::success(Proof {
                    chain,
                    scheme,
                    signature,
                    sct_list,
                    flags,
                }),
                Ok(_) => {
                    warn!(
                        request = %id,
                        %hostname,
                        %backend,
                        "signing backend returned an empty signature"
                    );
                    ProofResult::failure(ProofStatus::SigningUnavailable)
                }
                Err(error) => {
                    warn!(request = %id, %hostname, %backend, "signing failed: {error:#}");
                    ProofResult::failure(ProofStatus::SigningUnavailable)
                }
            };
            pending.finish(result);
        });
    }
}

/// Proof source with no certificates: every valid request is `not-found`.
///
/// Used when a server is started without any certificate configuration.
#[derive(Debug, Default)]
pub struct FailClosedProofSource {
    options: ProofSourceOptions,
    stats: Arc<ProofSourceStats>,
}

impl FailClosedProofSource {
    pub fn new(options: ProofSourceOptions) -> Self {
        Self {
            options,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> &Arc<ProofSourceStats> {
        &self.stats
    }
}

impl ProofSource for FailClosedProofSource {
    fn get_proof(&self, request: ProofRequest, sink: ProofCompletionSink) {
        self.stats.record_request();
        let status = match request.validate(self.options.transcript_hash) {
            Ok(()) => ProofStatus::NotFound,
            Err(_) => ProofStatus::InvalidRequest,
        };
        settle(&self.stats, sink, ProofResult::failure(status));
    }
}
