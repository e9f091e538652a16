// src/main.rs
//! Imua Staking Diagnostic Runner
//!
//! The library is normally embedded by a rendering shell that injects wallet
//! SDKs. This binary exercises everything that works without a wallet:
//! loads the configuration, probes the bootstrap status endpoint and the
//! XRPL node, optionally resolves a binding for a given native address, and
//! then idles until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imua_staking::binding::BindingSource;
use imua_staking::bootstrap::{target_network, BootstrapMonitor};
use imua_staking::config::StakingConfig;
use imua_staking::gateway::{EvmReader, UtxoGatewayReader};
use imua_staking::ledger::XrplClient;
use imua_staking::persist::LocalStore;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, value_parser, default_value = "config.toml")]
    config: PathBuf,

    #[clap(short, long)]
    verbose: bool,

    /// Native-chain address to resolve a binding for
    #[clap(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    info!("Starting Imua staking diagnostics v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", args.config);

    let config = StakingConfig::load(&args.config).context("Failed to load configuration")?;
    info!("✓ Configuration loaded ({} tokens)", config.tokens.len());

    let store = LocalStore::new(&config.store_path);
    let persisted = store.load().await;
    info!(
        "✓ Local store loaded ({} remembered wallets)",
        persisted.wallets.len()
    );

    // Bootstrap phase decides which EVM network everything targets
    let monitor = Arc::new(BootstrapMonitor::new(&config.bootstrap_status_url));
    match monitor.refresh().await {
        Ok(status) => {
            let network = target_network(&status, &config);
            info!(
                "✓ Bootstrap status: {:?}, staking {} (target network: {})",
                status.phase(),
                if status.staking_permitted() {
                    "permitted"
                } else {
                    "locked"
                },
                network.name
            );
        }
        Err(e) => warn!("Bootstrap status endpoint unreachable: {}", e),
    }

    // XRPL probe
    let xrpl = XrplClient::new();
    if xrpl.connect(&config.xrpl).await {
        info!("✓ XRPL node reachable at {}", config.xrpl.json_rpc_url);
    } else {
        warn!(
            "XRPL node unreachable: {}",
            xrpl.last_error().await.unwrap_or_default()
        );
    }

    // Optional binding lookup against the UTXO gateway
    if let Some(address) = &args.address {
        let status = monitor.status().await;
        let network = target_network(&status, &config);
        let gateway_address = network
            .utxo_gateway_address
            .as_deref()
            .context("Target network has no UTXO gateway configured")?;

        let reader = Arc::new(EvmReader::new(&network.rpc_url)?);
        let source = UtxoGatewayReader::new(reader, gateway_address)?;

        match source
            .bound_address(config.xrpl.client_chain_id, address)
            .await
        {
            Ok(Some(bound)) => info!("✓ {} is bound to {}", address, bound),
            Ok(None) => info!("✓ {} has no binding yet", address),
            Err(e) => warn!("Binding lookup failed: {}", e),
        }
    }

    info!("Diagnostics complete, press Ctrl-C to exit");
    signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("imua_staking={},reqwest=warn", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
