use std::path::PathBuf;

use axum::http::StatusCode;
use axum_core::response::{IntoResponse as AxumCoreIntoResponse, Response};

use crate::result::ProofStatus;

/// Problems building a selector entry or table.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("certificate chain is empty")]
    EmptyChain,
    #[error("entry has no host patterns")]
    NoPatterns,
    #[error("invalid host pattern {0:?}")]
    InvalidPattern(String),
    #[error("signing key supports no signature schemes")]
    NoSchemes,
    #[error("failed to parse leaf certificate: {0}")]
    CertificateParse(String),
    #[error("failed to read signing key public key: {0}")]
    PublicKey(String),
    #[error("leaf certificate public key does not match the signing key")]
    KeyMismatch,
}

/// Problems loading the proof source configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid PEM in {path}: {message}")]
    Pem { path: PathBuf, message: String },
    #[error("no certificates in {0}")]
    NoCertificates(PathBuf),
    #[error("invalid signing key {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("certificate for {hosts:?}: {source}")]
    Entry {
        hosts: Vec<String>,
        #[source]
        source: SelectorError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProofServerError {
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
    #[error("Invalid proof request: {0}")]
    BadRequest(String),
    #[error("Proof failed: {0}")]
    Proof(ProofStatus),
    #[error("Failed to reload configuration: {0}")]
    Reload(#[from] ConfigError),
    #[error("Server has no configuration file to reload")]
    ReloadUnavailable,
}

/// Trait implementation to convert this error into an axum http response
impl AxumCoreIntoResponse for ProofServerError {
    fn into_response(self) -> Response {
        match self {
            bad_request_error @ ProofServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, bad_request_error.to_string()).into_response()
            }
            ProofServerError::Proof(status) => {
                let code = match status {
                    ProofStatus::InvalidRequest => StatusCode::BAD_REQUEST,
                    ProofStatus::NotFound => StatusCode::NOT_FOUND,
                    ProofStatus::SigningUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ProofStatus::Success => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, status.to_string()).into_response()
            }
            reload_error @ ProofServerError::Reload(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reload_error.to_string()).into_response()
            }
            ProofServerError::ReloadUnavailable => {
                let message = ProofServerError::ReloadUnavailable.to_string();
                (StatusCode::CONFLICT, message).into_response()
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something wrong happened.",
            )
                .into_response(),
        }
    }
}
