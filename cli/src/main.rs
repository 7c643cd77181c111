//! The `hydrograph` binary: one capture run, or a staleness check alone.

use anyhow::Result;
use clap::Parser;
use hydrograph_core::core::status::StaleOutcome;
use hydrograph_core::{BrowserExporter, GraphCapture, RunOutcome};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hydrograph_cli::Cli;

fn main() -> Result<()> {
    // LOG_LEVEL first, then RUST_LOG, then info.
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let exporter = BrowserExporter::new(config.settings.acquisition.clone());
    let capture = GraphCapture::new(config, exporter);

    if cli.check_stale {
        info!("--- Checking for stale cached data ---");
        if let Some(StaleOutcome::Stamped { elapsed }) = capture.check_stale() {
            warn!(elapsed_hours = elapsed.num_hours(), "Published graph marked stale");
        }
        info!("--- Stale check finished ---");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    info!("--- Starting graph capture ---");
    match runtime.block_on(capture.run()) {
        RunOutcome::Captured { attempts, artifacts } => {
            info!(attempts, master = %artifacts.master.display(), "Graph published");
        }
        RunOutcome::Exhausted { attempts, stale } => {
            warn!(attempts, ?stale, "Capture failed, previous graph kept");
        }
    }
    info!("--- Capture finished ---");
    Ok(())
}
