//! Cycle orchestration.
//!
//! One `sync` call is one reconciliation cycle: group alignment first,
//! then every non-index-base source in list order. A source failure is
//! contained — logged, counted, and the cycle moves on — but it pins
//! `last_sync_time`, so the next cycle repeats the same
//! since-last-known-good window over all sources.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use viewsync_core::{DataSourceType, Result, SyncError, SyncMode};

use crate::config::SyncConfig;
use crate::groups::GroupReconciler;
use crate::source::{SourceOutcome, SourceReconciler};
use crate::state::SyncStateStore;
use crate::traits::{DataSourceDirectory, GroupStore, MetadataCatalog, ViewStore};

/// Outcome of one source within a cycle
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub outcome: Option<SourceOutcome>,
    pub error: Option<String>,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    /// Whether every source succeeded and `last_sync_time` advanced
    pub state_advanced: bool,
}

impl CycleReport {
    pub fn sources_succeeded(&self) -> usize {
        self.sources.iter().filter(|s| s.success).count()
    }
}

pub struct SyncCoordinator {
    directory: Arc<dyn DataSourceDirectory>,
    group_store: Arc<dyn GroupStore>,
    group_reconciler: GroupReconciler,
    source_reconciler: SourceReconciler,
    state: Arc<SyncStateStore>,
}

impl SyncCoordinator {
    pub fn new(
        directory: Arc<dyn DataSourceDirectory>,
        catalog: Arc<dyn MetadataCatalog>,
        views: Arc<dyn ViewStore>,
        groups: Arc<dyn GroupStore>,
        config: &SyncConfig,
    ) -> Self {
        let state = Arc::new(SyncStateStore::new());
        Self {
            directory,
            group_store: groups.clone(),
            group_reconciler: GroupReconciler::new(groups),
            source_reconciler: SourceReconciler::new(catalog, views, state.clone(), config.batch_size),
            state,
        }
    }

    pub fn state(&self) -> &Arc<SyncStateStore> {
        &self.state
    }

    /// Run one cycle, choosing the mode from persisted progress: never
    /// synced means full, otherwise incremental since the last
    /// known-good cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        match self.state.last_sync_time() {
            None => {
                info!("performing full sync, all metadata");
                self.sync(SyncMode::Full, None, cancel).await
            }
            Some(last) => {
                info!(since = %last, "performing incremental sync");
                self.sync(SyncMode::Incremental, Some(last), cancel).await
            }
        }
    }

    /// Run one reconciliation cycle in the given mode.
    ///
    /// Group reconciliation failures abort the cycle; per-source failures
    /// are contained. `last_sync_time` advances to the cycle start time
    /// only when every source succeeded.
    pub async fn sync(
        &self,
        mode: SyncMode,
        last_sync_time: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport> {
        let started_at = Utc::now();
        let cycle_start = Instant::now();
        info!(mode = %mode, "starting view synchronization cycle");

        let sources = self.directory.list().await?;
        let builtin_groups = self.group_store.list_builtin_groups().await?;
        self.group_reconciler
            .reconcile(&sources, &builtin_groups)
            .await?;

        let mut reports = Vec::new();
        let mut all_success = true;

        for source in &sources {
            if source.source_type == DataSourceType::IndexBase {
                debug!(source = %source.name, "skipping index base data source");
                continue;
            }
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let source_start = Instant::now();
            let result = self
                .source_reconciler
                .sync_source(source, mode, last_sync_time, cancel)
                .await;
            let duration_ms = source_start.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => {
                    info!(
                        source = %source.name,
                        duration_ms,
                        created = outcome.created,
                        updated = outcome.updated,
                        unchanged = outcome.unchanged,
                        source_deleted = outcome.source_deleted,
                        "data source synced"
                    );
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_source_outcome(&outcome);
                    reports.push(SourceReport {
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        success: true,
                        duration_ms,
                        outcome: Some(outcome),
                        error: None,
                    });
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    error!(source = %source.name, error = %e, "data source sync failed");
                    all_success = false;
                    reports.push(SourceReport {
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        success: false,
                        duration_ms,
                        outcome: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        let succeeded = reports.iter().filter(|r| r.success).count();
        info!(
            duration_ms = cycle_start.elapsed().as_millis() as u64,
            succeeded,
            total = reports.len(),
            "sync cycle completed"
        );

        if all_success {
            self.state.set_last_sync_time(started_at);
            debug!(last_sync_time = %started_at, "sync state advanced");
        } else {
            warn!(
                failed = reports.len() - succeeded,
                total = reports.len(),
                "sync completed with errors, sync state not advanced"
            );
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_cycle(mode, all_success, cycle_start.elapsed());

        Ok(CycleReport {
            mode,
            started_at,
            finished_at,
            sources: reports,
            state_advanced: all_success,
        })
    }
}
