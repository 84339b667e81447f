//! Veritome: PubMed verification and enrichment for extracted guidelines.
//! Entry point for the `veritome` binary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use veritome_verify::assembler::Assembler;
use veritome_verify::audit::{AuditSink, JsonlAuditLog, NullAudit};
use veritome_verify::gatekeeper::Gatekeeper;
use veritome_verify::pipeline::Pipeline;
use veritome_verify::sources::pubmed::PubMedClient;
use veritome_verify::store::{discover_inputs, FsDocumentStore};

use crate::config::Config;

/// Verify extracted guideline records against PubMed and write database-ready JSON.
#[derive(Debug, Parser)]
#[command(name = "veritome", version, about)]
struct Args {
    /// Path to veritome.toml.
    #[arg(long, env = "VERITOME_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of intermediate records (overrides paths.input_dir).
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for validated records (overrides paths.output_dir).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Quarantine directory (overrides paths.failed_dir).
    #[arg(long)]
    failed_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to read .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("veritome=info,info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.input_dir {
        config.paths.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.paths.output_dir = dir;
    }
    if let Some(dir) = args.failed_dir {
        config.paths.failed_dir = dir;
    }

    info!(
        input  = %config.paths.input_dir.display(),
        output = %config.paths.output_dir.display(),
        failed = %config.paths.failed_dir.display(),
        "Veritome starting"
    );

    let limiter = config.rate_limiter()?;
    let pubmed = PubMedClient::new(config.take_pubmed_config(), limiter)
        .context("building PubMed client")?;
    let store = FsDocumentStore::new(&config.paths.output_dir, &config.paths.failed_dir)
        .await
        .context("preparing output directories")?;

    let audit: Arc<dyn AuditSink> = match config.audit_log() {
        Some(path) => Arc::new(JsonlAuditLog::new(path).await.context("preparing audit log")?),
        None => {
            warn!("Audit log disabled");
            Arc::new(NullAudit)
        }
    };

    let pipeline = Pipeline::new(Arc::new(pubmed), Arc::new(store))
        .with_gatekeeper(Gatekeeper::new(config.thresholds()))
        .with_assembler(Assembler::new(config.fallback_policy())?)
        .with_audit(audit);

    let inputs = discover_inputs(&config.paths.input_dir).await?;
    if inputs.is_empty() {
        warn!(dir = %config.paths.input_dir.display(), "No input documents found");
        return Ok(());
    }

    let report = pipeline.run(&inputs).await;
    println!(
        "Processed: {}  Skipped: {}  Failed: {}  (verified {}, fallback {}) in {} ms",
        report.processed, report.skipped, report.failed, report.verified, report.fallback, report.duration_ms
    );
    Ok(())
}
