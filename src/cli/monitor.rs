//! Monitor command - streams health snapshots until interrupted

use clap::Args;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::infrastructure::cache::CacheLayer;

use super::{bootstrap, print_json};

#[derive(Debug, Args, PartialEq)]
pub struct MonitorArgs {
    /// Probe interval in seconds (defaults to the configured interval)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

/// Runs the health monitor in the foreground
pub async fn run(args: MonitorArgs) -> anyhow::Result<()> {
    let mut config = bootstrap()?;

    if let Some(interval) = args.interval_secs {
        config.cache.health_check_interval_secs = interval.max(1);
    }

    let layer = CacheLayer::new(&config.cache);
    let mut events = layer.connector().subscribe();
    let mut snapshots = layer.health().subscribe();

    if let Err(e) = layer.start().await {
        warn!(error = %e, "Initial cache connection failed");
    }

    // Publish an immediate snapshot rather than waiting a full interval
    layer.get_health().await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupt received, stopping monitor");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }

                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_json(&snapshot)?;
                }
            }
            event = events.recv() => match event {
                Ok(event) => info!(event = ?event, "Cache connector event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Connector events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    layer.shutdown().await;
    Ok(())
}
