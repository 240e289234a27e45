//! nextmme MME node
//!
//! This is the main binary for the MME. It implements:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Task registration and lifecycle management
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! nr-mme -c config/mme.yaml
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};

use nextmme_common::logging::{init_logging, LogLevel};
use nextmme_mme::{load_and_validate_mme_config, MmeNode, TransportLink};

/// nextmme MME - inter-task bus based mobility management entity
#[derive(Parser, Debug)]
#[command(name = "nr-mme")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the MME configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: String,

    /// Overrides the log level of the configuration file
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    println!("nextmme MME");
    println!("===========");

    match run_mme(args).await {
        Ok(()) => {
            info!("MME exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("MME failed: {:#}", e);
            eprintln!("MME failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Main MME execution logic
async fn run_mme(args: Args) -> Result<()> {
    let config = load_and_validate_mme_config(&args.config_file)
        .with_context(|| format!("Failed to load configuration from {}", args.config_file))?;

    init_logging(args.log_level.unwrap_or(config.log_level));
    info!("Configuration loaded from: {}", args.config_file);
    info!(
        "Bus: max_tasks={}, mailbox={}, control={}",
        config.bus.max_tasks, config.bus.mailbox_capacity, config.bus.control_capacity
    );

    let mut node = MmeNode::init(&config).context("Failed to initialize MME node")?;
    let transport = node.take_transport();
    node.start().await.context("Failed to start MME tasks")?;

    for (id, name, state) in node.status_summary() {
        info!("{} ({}): {}", name, id, state);
    }
    info!("MME started, waiting for shutdown signal...");

    // No socket layer is attached; outbound PDUs are only logged.
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = drain_outbound(transport) => {
            warn!("Transport link closed");
        }
    }

    match node.shutdown().await {
        Ok(()) => info!("All tasks shut down successfully"),
        Err(e) => warn!("Some tasks failed during shutdown: {}", e),
    }
    Ok(())
}

async fn drain_outbound(transport: Option<TransportLink>) {
    let Some(mut transport) = transport else {
        return std::future::pending().await;
    };
    while let Some(pdu) = transport.recv_outbound().await {
        debug!(
            association_id = pdu.association_id,
            stream = pdu.stream,
            len = pdu.data.len(),
            "Outbound PDU"
        );
    }
}
