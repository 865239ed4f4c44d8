//! node-drainer - drain an EKS node for one ASG terminate lifecycle event.

use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use node_drainer::cache::FileCache;
use node_drainer::cluster::KubeConnector;
use node_drainer::providers::aws::{AwsCredentials, AwsEndpoints};
use node_drainer::providers::Aws;
use node_drainer::{DrainerConfig, LifecycleEnvelope, LifecycleEvent, Pipeline, PipelineOutcome};

/// Drain the node behind an Auto Scaling terminate lifecycle event.
#[derive(Parser)]
#[command(name = "node-drainer")]
#[command(about = "Cordon and drain an EKS node before its instance terminates")]
#[command(version)]
struct Cli {
    /// Event JSON file (EventBridge envelope or bare detail); stdin if omitted
    #[arg(long, env = "DRAINER_EVENT_FILE")]
    event: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "DRAINER_LOG_FORMAT", value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let event = read_event(cli.event.as_ref())?;
    let config = DrainerConfig::from_env().context("Invalid configuration")?;
    let credentials = AwsCredentials::from_env().context("AWS credentials not available")?;

    let mut aws =
        Aws::new(credentials, config.region.clone()).context("Failed to create AWS client")?;
    if let Some(endpoint) = &config.endpoint_url {
        aws = aws.with_endpoints(AwsEndpoints::single(endpoint));
    }

    let pipeline = Pipeline::from_config(
        &config,
        aws,
        Arc::new(FileCache::new(&config.cache_dir)),
        Arc::new(KubeConnector),
    );

    match pipeline
        .process(&event)
        .await
        .with_context(|| format!("Failed to process event for {}", event.instance_id))?
    {
        PipelineOutcome::Drained { report, .. } => info!(
            attempted = report.outcome.attempted,
            succeeded = report.outcome.succeeded,
            "Done"
        ),
        PipelineOutcome::Unreachable { error, .. } => info!(error = %error, "Done without draining"),
        PipelineOutcome::Abandoned { instance_id, .. } => {
            info!(instance_id = %instance_id, "Nothing to drain");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("node_drainer=info,warn"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }
}

fn read_event(path: Option<&PathBuf>) -> Result<LifecycleEvent> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read event from stdin")?;
            raw
        }
    };

    if let Ok(envelope) = LifecycleEnvelope::from_json(&raw) {
        return Ok(envelope.detail);
    }
    serde_json::from_str(&raw)
        .context("Event is neither an EventBridge envelope nor lifecycle detail")
}
