use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConfigReloader;
use crate::error::ProofServerError;
use crate::request::{ProofRequest, SignatureScheme};
use crate::result::ProofResult;
use crate::sink::{ProofCompletionSink, RequestId};
use crate::source::{ProofSource, ProofSourceStats, StatsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn ProofSource>,
    pub stats: Arc<ProofSourceStats>,
    pub reloader: Option<Arc<ConfigReloader>>,
    next_request: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn ProofSource>,
        stats: Arc<ProofSourceStats>,
        reloader: Option<Arc<ConfigReloader>>,
    ) -> Self {
        Self {
            source,
            stats,
            reloader,
            next_request: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequestBody {
    pub hostname: String,
    /// Hex encoded.
    pub transcript_digest: String,
    /// TLS SignatureScheme code points in preference order.
    pub signature_schemes: Vec<SignatureScheme>,
    #[serde(default)]
    pub sct_supported: bool,
    /// Hex leaf hash cached by the client, as returned in `leaf_hash`.
    #[serde(default)]
    pub expected_leaf_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResponseBody {
    pub status: String,
    /// Hex DER certificates, leaf first.
    pub certificates: Vec<String>,
    pub leaf_hash: String,
    pub signature_scheme: SignatureScheme,
    pub signature: String,
    pub sct_list: Option<String>,
    pub send_expect_ct_header: bool,
    pub cert_matched_sni: bool,
    pub leaf_cert_matches_expected: Option<bool>,
}

impl ProofResponseBody {
    fn from_result(result: ProofResult) -> Result<Self, ProofServerError> {
        let status = result.status();
        let proof = result.into_proof().ok_or(ProofServerError::Proof(status))?;
        Ok(Self {
            status: status.to_string(),
            certificates: proof.chain.iter().map(hex::encode).collect(),
            leaf_hash: proof.chain.leaf_hash().map(|h| format!("{h:016x}")).unwrap_or_default(),
            signature_scheme: proof.scheme,
            signature: hex::encode(&proof.signature),
            sct_list: proof.sct_list.as_ref().map(hex::encode),
            send_expect_ct_header: proof.flags.send_expect_ct_header,
            cert_matched_sni: proof.flags.cert_matched_sni,
            leaf_cert_matches_expected: proof.flags.leaf_cert_matches_expected,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponseBody {
    pub entries: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(|| async move { (StatusCode::OK, "Ok").into_response() }))
        .route("/proof", post(proof_handler))
        .route("/reload", post(reload_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

pub async fn run(host: String, port: u16, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "proof server listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving proof requests")?;

    Ok(())
}

async fn proof_handler(
    State(state): State<AppState>,
    Json(body): Json<ProofRequestBody>,
) -> Result<Json<ProofResponseBody>, ProofServerError> {
    let digest = hex::decode(&body.transcript_digest)
        .map_err(|e| ProofServerError::BadRequest(format!("transcript_digest is not hex: {e}")))?;
    let mut request = ProofRequest::new(&body.hostname, digest, body.signature_schemes)
        .with_sct_supported(body.sct_supported);
    if let Some(leaf_hash) = &body.expected_leaf_hash {
        let leaf_hash = u64::from_str_radix(leaf_hash, 16).map_err(|e| {
            ProofServerError::BadRequest(format!("expected_leaf_hash is not a hex u64: {e}"))
        })?;
        request = request.with_expected_leaf_hash(leaf_hash);
    }

    let id = RequestId(state.next_request.fetch_add(1, Ordering::Relaxed));
    let (sink, receiver) = ProofCompletionSink::channel(id);
    state.source.get_proof(request, sink);

    let result = receiver.await;
    Ok(Json(ProofResponseBody::from_result(result)?))
}

async fn reload_handler(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponseBody>, ProofServerError> {
    let reloader = state.reloader.clone().ok_or(ProofServerError::ReloadUnavailable)?;
    let entries = tokio::task::spawn_blocking(move || reloader.reload())
        .await
        .context("reload task did not complete")??;
    Ok(Json(ReloadResponseBody { entries }))
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
