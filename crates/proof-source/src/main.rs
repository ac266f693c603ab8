use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quic_proof_source::{
    AppState, CertificateSelector, ConfigReloader, FailClosedProofSource, ProofSourceConfig,
    ProofSourceOptions, SelectorProofSource, run,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[clap(long, env = "PROOF_SERVER_HOST", default_value = "127.0.0.1")]
    host: String,
    #[clap(long, env = "PROOF_SERVER_PORT", default_value = "3000")]
    port: u16,
    /// JSON certificate configuration. Without it every proof is not-found.
    #[clap(long, env = "PROOF_SOURCE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quic_proof_source=info,proof_server=info")),
        )
        .init();

    let args = Args::parse();

    let state = match args.config {
        Some(path) => {
            let config = ProofSourceConfig::from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            let table = config.build_table().context("building certificate table")?;
            info!(entries = table.len(), path = %path.display(), "certificates loaded");

            let selector = Arc::new(CertificateSelector::new(table));
            let source = SelectorProofSource::new(
                Arc::clone(&selector),
                config.options(),
                tokio::runtime::Handle::current(),
            );
            let stats = Arc::clone(source.stats());
            let reloader = Arc::new(ConfigReloader::new(path, selector));
            AppState::new(Arc::new(source), stats, Some(reloader))
        }
        None => {
            warn!("no certificate configuration given, every proof request will fail");
            let source = FailClosedProofSource::new(ProofSourceOptions::default());
            let stats = Arc::clone(source.stats());
            AppState::new(Arc::new(source), stats, None)
        }
    };

    run(args.host, args.port, state).await
}
