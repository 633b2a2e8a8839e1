//! Periodic trigger for processing cycles

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::Labeler;
use crate::error::{LabelerError, Result};

/// Run a cycle, then sleep for the configured interval, until `shutdown` resolves
///
/// The interval is re-read from settings after every cycle so edits apply
/// without a restart. Returns the number of cycles attempted. Only errors that
/// need re-authentication stop the loop early.
pub async fn run_periodic<F>(labeler: &Labeler, shutdown: F) -> Result<usize>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut cycles = 0;

    loop {
        cycles += 1;
        match labeler.run_cycle().await {
            Ok(report) => debug!("Scheduled cycle {} finished: {:?}", cycles, report),
            Err(LabelerError::CycleInProgress) => {
                info!("Previous cycle still running, skipping this tick")
            }
            Err(e) if e.requires_reauth() => return Err(e),
            Err(e) => warn!("Scheduled cycle failed: {}", e),
        }

        let minutes = match labeler.get_settings().await {
            Ok(settings) => settings.processing_interval_minutes.max(1),
            Err(e) => {
                warn!("Could not read processing interval, using 5 minutes: {}", e);
                5
            }
        };
        debug!("Next cycle in {} minutes", minutes);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(minutes.saturating_mul(60))) => {}
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                return Ok(cycles);
            }
        }
    }
}

/// [`run_periodic`] until Ctrl-C
pub async fn run_until_ctrl_c(labeler: &Labeler) -> Result<usize> {
    run_periodic(labeler, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}
