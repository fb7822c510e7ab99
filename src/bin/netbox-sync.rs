// Copyright (c) 2025 - Cowboy AI, Inc.
//! NetBox Sync
//!
//! Reconciles a desired-state document into NetBox:
//! - desired.yml (+ facts.yml) → Reconciler → NetBox API
//!
//! Run with: cargo run --bin netbox-sync -- --desired desired.yml
//!
//! Prerequisites:
//! 1. NetBox API accessible (via NETBOX_URL environment variable)
//! 2. NETBOX_API_TOKEN, or NETBOX_USERNAME and NETBOX_PASSWORD, set
//! 3. Optionally SLACK_WEBHOOK_URL for notifications

use anyhow::{Context, Result};
use clap::Parser;
use netbox_sync::{
    facts::FactsDocument,
    notify::{Notifier, SlackNotifier},
    run_with_session, DesiredState, NetBoxClient, NetBoxSessions, RunConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Reconcile declarative desired state into NetBox
#[derive(Debug, Parser)]
#[command(name = "netbox-sync", version, about)]
struct Args {
    /// Desired-state document
    #[arg(long, env = "NETBOX_DESIRED", default_value = "desired.yml")]
    desired: PathBuf,

    /// Captured device output to fold into the desired state
    #[arg(long, env = "NETBOX_FACTS")]
    facts: Option<PathBuf>,

    /// Never update existing records
    #[arg(long)]
    create_only: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Post outcomes to the Slack webhook in SLACK_WEBHOOK_URL
    #[arg(long)]
    notify: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("🚀 Starting NetBox Sync");

    // Load configuration
    let mut config = RunConfig::from_env().context("Failed to load configuration")?;
    if args.create_only {
        config.options.create_only = true;
    }
    info!("📋 Configuration loaded:");
    info!("  - NetBox URL: {}", config.netbox.base_url);
    info!("  - Timeout: {}s", config.netbox.timeout_secs);
    info!("  - Create only: {}", config.options.create_only);

    let mut desired = DesiredState::load(&args.desired)
        .with_context(|| format!("Failed to load {}", args.desired.display()))?;
    if let Some(path) = &args.facts {
        let facts = FactsDocument::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        desired
            .apply_facts(&facts)
            .context("Failed to apply device facts")?;
    }

    let notifier: Option<Arc<dyn Notifier>> = match (&config.slack_webhook, args.notify) {
        (Some(url), true) => Some(Arc::new(
            SlackNotifier::new(url.clone()).context("Failed to create Slack notifier")?,
        )),
        (None, true) => {
            warn!("--notify given but SLACK_WEBHOOK_URL is not set");
            None
        }
        _ => None,
    };

    let sessions = Arc::new(
        NetBoxSessions::new(&config.netbox).context("Failed to create NetBox session client")?,
    );
    let netbox = config.netbox.clone();

    let report = run_with_session(
        sessions,
        &config.credentials,
        |token| NetBoxClient::new(&netbox, token).map_err(Into::into),
        &desired,
        config.options.clone(),
        notifier,
    )
    .await
    .context("Reconciliation run failed")?;

    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("📝 Report written to {}", path.display());
    }

    if report.counts().has_problems() {
        warn!("⚠️ {}", report.summary());
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
