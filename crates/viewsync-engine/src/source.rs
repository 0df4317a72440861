//! Per-source reconciliation.
//!
//! One call handles one data source: a full-list deletion-detection pass
//! first (an incremental fetch alone cannot distinguish "not changed"
//! from "deleted"), then the time-filtered create/update pass in bounded
//! batches. Collaborator failures abort the source, never the cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use viewsync_core::{
    BatchResult, DataSource, MetadataTable, Result, SyncAction, SyncError, SyncMode,
    TableSyncResult, View, ViewStatus,
};

use crate::names::NameAllocator;
use crate::state::SyncStateStore;
use crate::traits::{MetadataCatalog, ViewStore};
use crate::{batch, materialize};

/// What one source's reconciliation did this cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SourceOutcome {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub source_deleted: usize,
    /// Catalog records that had no table detail
    pub invalid: usize,
}

pub struct SourceReconciler {
    catalog: Arc<dyn MetadataCatalog>,
    views: Arc<dyn ViewStore>,
    state: Arc<SyncStateStore>,
    batch_size: usize,
}

impl SourceReconciler {
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        views: Arc<dyn ViewStore>,
        state: Arc<SyncStateStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            catalog,
            views,
            state,
            batch_size,
        }
    }

    /// Reconcile one data source.
    ///
    /// `last_sync_time` filters the incremental fetch; it is ignored for
    /// a full sync. The deletion-detection pass always runs against the
    /// unfiltered table list, in both modes.
    pub async fn sync_source(
        &self,
        source: &DataSource,
        mode: SyncMode,
        last_sync_time: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::default();

        let views = self.views.views_by_source(&source.id).await?;
        let mut views_by_name: HashMap<String, View> = views
            .iter()
            .map(|v| (v.technical_name.clone(), v.clone()))
            .collect();

        // Display-name scope for this source, seeded with the names its
        // live views already hold.
        let mut view_names = NameAllocator::new();
        for view in views.iter().filter(|v| v.is_live()) {
            view_names.seed(&view.view_name, &view.view_id);
        }

        outcome.source_deleted = self
            .mark_source_deleted(source, &mut views_by_name)
            .await?;

        let updated_since = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental => last_sync_time,
        };
        let refs = self
            .catalog
            .list_tables_by_source(&source.id, updated_since)
            .await?;
        info!(
            source = %source.name,
            mode = %mode,
            count = refs.len(),
            "metadata records found for source"
        );

        if refs.is_empty() {
            // Nothing to create or update. A full sync that lists no
            // tables at all has already had every live view marked
            // source-deleted by the pass above.
            debug!(source = %source.name, mode = %mode, "no metadata for source this cycle");
            return Ok(outcome);
        }

        let chunks = batch::chunk(&refs, self.batch_size);
        info!(
            source = %source.name,
            batch_size = self.batch_size,
            batches = chunks.len(),
            "split metadata into batches"
        );

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let ids: Vec<String> = chunk.iter().map(|r| r.id.clone()).collect();
            let batch_outcome = self
                .process_batch(index + 1, chunk.len(), ids, source, &mut views_by_name, &mut view_names)
                .await?;
            outcome.created += batch_outcome.created;
            outcome.updated += batch_outcome.updated;
            outcome.unchanged += batch_outcome.unchanged;
            outcome.invalid += batch_outcome.invalid;

            info!(
                source = %source.name,
                batch = index + 1,
                batches = chunks.len(),
                created = batch_outcome.created,
                updated = batch_outcome.updated,
                unchanged = batch_outcome.unchanged,
                "batch completed"
            );
        }

        Ok(outcome)
    }

    /// Full-list deletion pass: any live view whose technical name has no
    /// matching metadata table is transitioned to `SourceDeleted`.
    async fn mark_source_deleted(
        &self,
        source: &DataSource,
        views_by_name: &mut HashMap<String, View>,
    ) -> Result<usize> {
        let all_tables = self.catalog.list_tables_by_source(&source.id, None).await?;
        debug!(
            source = %source.name,
            tables = all_tables.len(),
            views = views_by_name.len(),
            "running deletion-detection pass"
        );

        let known_names: HashSet<&str> = all_tables.iter().map(|t| t.name.as_str()).collect();

        let deleted: Vec<(String, String)> = views_by_name
            .values()
            .filter(|v| v.is_live() && !known_names.contains(v.technical_name.as_str()))
            .map(|v| (v.view_id.clone(), v.technical_name.clone()))
            .collect();

        if deleted.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = deleted.iter().map(|(id, _)| id.clone()).collect();
        self.views.mark_deleted(&ids).await?;

        let now = Utc::now();
        for (view_id, technical_name) in &deleted {
            if let Some(view) = views_by_name.get_mut(technical_name) {
                view.status = ViewStatus::SourceDeleted;
                view.delete_time = Some(now);
            }
            self.state.record_table_result(TableSyncResult {
                view_id: view_id.clone(),
                technical_name: technical_name.clone(),
                action: SyncAction::SourceDeleted,
                synced_at: now,
            });
        }

        info!(
            source = %source.name,
            count = deleted.len(),
            "marked views as source deleted"
        );
        Ok(deleted.len())
    }

    async fn process_batch(
        &self,
        batch_id: usize,
        ref_count: usize,
        ids: Vec<String>,
        source: &DataSource,
        views_by_name: &mut HashMap<String, View>,
        view_names: &mut NameAllocator,
    ) -> Result<SourceOutcome> {
        let started_at = Utc::now();
        let mut outcome = SourceOutcome::default();

        let tables = self.catalog.get_tables_by_ids(&ids).await?;

        let mut to_create: Vec<&MetadataTable> = Vec::new();
        let mut to_update: Vec<&MetadataTable> = Vec::new();
        for table in tables.iter() {
            let Some(info) = table.table.as_ref() else {
                continue;
            };
            if views_by_name.contains_key(info.name.as_str()) {
                to_update.push(table);
            } else {
                to_create.push(table);
            }
        }
        let valid_count = to_create.len() + to_update.len();
        outcome.invalid = ref_count - valid_count;

        let need_created = to_create.len();
        let need_updated = to_update.len();

        // Creates first, as a single batched insert
        let mut created_views = Vec::with_capacity(to_create.len());
        for table in to_create {
            created_views.push(materialize::build_view(table, view_names)?);
        }
        if !created_views.is_empty() {
            self.views.insert(&created_views).await?;
        }
        let now = Utc::now();
        for view in created_views {
            self.state.record_table_result(TableSyncResult {
                view_id: view.view_id.clone(),
                technical_name: view.technical_name.clone(),
                action: SyncAction::Created,
                synced_at: now,
            });
            outcome.created += 1;
            views_by_name.insert(view.technical_name.clone(), view);
        }

        // Updates one at a time; unchanged tables cost no store call
        for table in to_update {
            let Some(info) = table.table.as_ref() else {
                continue;
            };
            let Some(existing) = views_by_name.get(info.name.as_str()).cloned() else {
                continue;
            };

            let rebuilt = materialize::build_updated_view(table, &existing)?;
            let revived = !existing.is_live();
            if revived || materialize::fields_changed(&existing.fields, &rebuilt.fields) {
                self.views.update(&rebuilt).await?;
                self.state.record_table_result(TableSyncResult {
                    view_id: rebuilt.view_id.clone(),
                    technical_name: rebuilt.technical_name.clone(),
                    action: SyncAction::Updated,
                    synced_at: Utc::now(),
                });
                outcome.updated += 1;
                views_by_name.insert(rebuilt.technical_name.clone(), rebuilt);
            } else {
                self.state.record_table_result(TableSyncResult {
                    view_id: existing.view_id.clone(),
                    technical_name: existing.technical_name.clone(),
                    action: SyncAction::Unchanged,
                    synced_at: Utc::now(),
                });
                outcome.unchanged += 1;
            }
        }

        self.state.record_batch(BatchResult {
            batch_id,
            total_meta_table_count: ref_count,
            invalid_meta_table_count: outcome.invalid,
            need_created_count: need_created,
            need_updated_count: need_updated,
            success_count: valid_count,
            error_count: 0,
            started_at,
            finished_at: Utc::now(),
        });

        Ok(outcome)
    }
}
