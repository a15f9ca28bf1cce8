//! Attestry attester service.
//!
//! This binary provides:
//! - The background expiry loop (scan, revoke after one year, remove after
//!   two)
//! - The transaction batcher behind `request_attestation`
//! - A dry-run inventory report
//!
//! Transaction signing lives in the ledger gateway; this process never sees
//! key material.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use attestry_attester::batcher::TransactionBatcher;
use attestry_attester::config::Config;
use attestry_attester::indexer::{EventSource, IndexerClient};
use attestry_attester::inventory::{ExpiryInventory, ExpiryService};
use attestry_attester::ledger::{HttpLedgerClient, LedgerClient};
use attestry_attester::oracle::RevocationOracle;
use attestry_attester::scanner::AttestationScanner;
use attestry_core::DidIdentifier;

#[derive(Parser)]
#[command(name = "attestry-attester")]
#[command(version, about = "Attestation lifecycle service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "attester.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the attester service (expiry loop + batcher)
    Run,

    /// Report what is due for revocation or removal, without submitting
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    info!("Attestry attester starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_service(&cli.config).await?,
        Commands::Scan => scan_once(&cli.config).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("attestry_attester=debug,attestry_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("attestry_attester=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();

    Ok(())
}

struct Parts {
    ledger: Arc<dyn LedgerClient>,
    scanner: AttestationScanner,
}

fn build_parts(config: &Config) -> Result<Parts> {
    let ledger: Arc<dyn LedgerClient> = Arc::new(
        HttpLedgerClient::new(
            &config.ledger.gateway_url,
            config.ledger.request_timeout(),
            config.ledger.auth_token.clone(),
            config.ledger.retry_attempts,
            config.ledger.retry_delay(),
        )
        .context("Failed to build ledger gateway client")?,
    );

    let indexer = Arc::new(
        IndexerClient::new(
            &config.indexer.base_url,
            config.indexer.request_timeout(),
            config.indexer.retry_attempts,
            config.indexer.retry_delay(),
        )
        .context("Failed to build indexer client")?,
    );

    let source = EventSource::new(
        indexer,
        config.indexer.page_size,
        config.indexer.block_range,
        config.indexer.fetch_interval(),
    );

    let issuer: DidIdentifier = config
        .ledger
        .issuer_did
        .parse()
        .context("Invalid issuer DID")?;

    let scanner = AttestationScanner::new(source, ledger.clone(), issuer);

    Ok(Parts { ledger, scanner })
}

/// Main service - runs the expiry loop and the transaction batcher
async fn run_service(config_path: &str) -> Result<()> {
    info!("Starting attester service with config: {}", config_path);

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Ledger gateway: {}", config.ledger.gateway_url);
    info!("  Indexer: {}", config.indexer.base_url);
    info!("  Issuer: {}", config.ledger.issuer_did);
    info!("  Expiry cycle: {}s", config.expiry.cycle_interval_secs);

    let parts = build_parts(&config)?;
    let oracle = RevocationOracle::new(parts.ledger.clone());

    let (batcher, batcher_handle) = TransactionBatcher::spawn(
        parts.ledger.clone(),
        config.batcher.max_failures,
        config.batcher.submit_timeout(),
    );

    info!("Transaction batcher started");

    let service = ExpiryService::new(
        parts.scanner,
        oracle,
        batcher.clone(),
        config.expiry.cycle_interval(),
    );
    let mut expiry_handle = tokio::spawn(service.run());

    info!("Expiry service started");
    info!("Attester is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut expiry_handle => {
            match result {
                Ok(Ok(())) => {
                    warn!("Expiry service exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => {
                    Err(e).context("Expiry service failed")
                }
                Err(e) => {
                    Err(anyhow::anyhow!("Expiry task panicked: {}", e))
                }
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            expiry_handle.abort();
            drop(batcher);
            // The batcher worker finishes (or times out) any in-flight
            // transaction before exiting; abandoning it mid-air would risk a
            // double submission on restart.
            if batcher_handle.await.is_err() {
                warn!("Batcher worker did not shut down cleanly");
            }
            Ok(())
        }
    }
}

/// One-shot inventory dry run
async fn scan_once(config_path: &str) -> Result<()> {
    info!("Scanning attestation inventory");

    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    let parts = build_parts(&config)?;

    let mut inventory = ExpiryInventory::new();
    inventory
        .refresh(&parts.scanner, chrono::Utc::now())
        .await
        .context("Inventory refresh failed")?;

    let summary = inventory.summary();

    println!("\n=== Attestation expiry inventory ===\n");
    println!("Due for revocation: {}", summary.to_revoke);
    for record in inventory.due_for_revocation() {
        println!(
            "  {} (block {}, created {})",
            record.claim_hash,
            record.block,
            record.created_at.to_rfc3339()
        );
    }

    println!("\nDue for removal: {}", summary.to_remove);
    for record in inventory.due_for_removal() {
        println!(
            "  {} (block {}, created {})",
            record.claim_hash,
            record.block,
            record.created_at.to_rfc3339()
        );
    }

    println!("\nWatched for later removal: {}", summary.to_remove_later);
    println!();

    Ok(())
}
