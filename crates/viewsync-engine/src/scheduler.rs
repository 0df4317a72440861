//! Background scheduling.
//!
//! A single loop runs one cycle, sleeps for the configured interval, and
//! repeats for the lifetime of the process. Construction and start are
//! separate so tests can build isolated engines and stop them
//! deterministically; shutdown is honored between sources and batches as
//! well as during the inter-cycle sleep.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use viewsync_core::{Result, SyncError};

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;

pub struct Scheduler {
    coordinator: Arc<SyncCoordinator>,
    config: SyncConfig,
}

impl Scheduler {
    /// Build an un-started scheduler. Fails on invalid configuration.
    pub fn new(coordinator: Arc<SyncCoordinator>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coordinator,
            config,
        })
    }

    /// Spawn the sync loop and return its lifecycle handle.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(run_loop(self.coordinator, self.config, loop_cancel));
        SchedulerHandle { cancel, task }
    }
}

/// Handle to a running sync loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request shutdown and wait for the loop to stop. In-flight work
    /// stops at the next source or batch boundary.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "sync loop task failed to join");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_loop(coordinator: Arc<SyncCoordinator>, config: SyncConfig, cancel: CancellationToken) {
    info!(interval = ?config.poll_interval, "view sync loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match coordinator.run_cycle(&cancel).await {
            Ok(report) => {
                info!(
                    mode = %report.mode,
                    succeeded = report.sources_succeeded(),
                    total = report.sources.len(),
                    advanced = report.state_advanced,
                    "sync cycle finished"
                );
            }
            Err(SyncError::Cancelled) => break,
            Err(e) => {
                // Cycle errors are operational; the loop retries next tick
                error!(error = %e, "sync cycle failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    info!("view sync loop stopped");
}
