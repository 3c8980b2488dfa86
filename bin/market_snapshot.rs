//! # Market Snapshot
//!
//! Prints the TVL-weighted market snapshot as JSON, once or on an interval.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin market_snapshot -- --config Config.toml --pretty
//! cargo run --bin market_snapshot -- --watch 60
//! ```
//!
//! Press Ctrl+C to stop watch mode.

use anyhow::Result;
use clap::Parser;
use multichain_market_sdk::{metrics, Orchestrator, Settings};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::{interval, Duration};

#[derive(Parser)]
#[command(name = "market_snapshot")]
#[command(about = "TVL-weighted token price across Ethereum, Optimism, Base and Osmosis")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(long, short, default_value = "Config.toml")]
    config: PathBuf,

    /// Recompute every N seconds instead of exiting after one snapshot
    #[arg(long)]
    watch: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long, default_value = "false")]
    pretty: bool,

    /// Expose Prometheus metrics on this address (observability builds only)
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

fn print_snapshot(snapshot: &multichain_market_sdk::MarketSnapshot, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    println!("{}", json);
    Ok(())
}

#[cfg(feature = "observability")]
fn install_exporter(addr: Option<std::net::SocketAddr>) -> Result<()> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        log::info!("📈 Prometheus exporter listening on {}", addr);
    }
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn install_exporter(addr: Option<std::net::SocketAddr>) -> Result<()> {
    if addr.is_some() {
        log::warn!("--metrics-addr ignored: built without the `observability` feature");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();
    let args = Args::parse();

    install_exporter(args.metrics_addr)?;
    metrics::describe_metrics();

    let settings = Settings::from_path(&args.config)?;
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let Some(every) = args.watch else {
        let snapshot = orchestrator.market_snapshot().await?;
        return print_snapshot(&snapshot, args.pretty);
    };

    let mut ticker = interval(Duration::from_secs(every.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // En modo watch un fallo no detiene el servicio
                match orchestrator.market_snapshot().await {
                    Ok(snapshot) => print_snapshot(&snapshot, args.pretty)?,
                    Err(e) => log::error!("❌ Snapshot failed ({}): {}", e.kind(), e),
                }
            }
            _ = signal::ctrl_c() => {
                log::info!("🛑 Shutting down");
                break;
            }
        }
    }
    Ok(())
}
