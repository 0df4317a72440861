//! Shared sync state.
//!
//! The engine's only cross-cycle mutable state: the last known-good sync
//! timestamp plus bounded history buffers for introspection. Everything
//! goes through this store's atomic operations; the lock is never
//! exposed and nothing does I/O while holding it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use viewsync_core::{BatchResult, SyncState, TableSyncResult};

/// Most recent batch results retained
const MAX_BATCH_HISTORY: usize = 100;

/// Most recent per-table results retained
const MAX_TABLE_HISTORY: usize = 1000;

#[derive(Debug, Default)]
pub struct SyncStateStore {
    inner: RwLock<SyncState>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start time of the last fully-successful cycle. `None` means never
    /// synced, which forces the next cycle to run full.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_sync_time
    }

    pub fn set_last_sync_time(&self, t: DateTime<Utc>) {
        self.inner.write().last_sync_time = Some(t);
    }

    pub fn record_batch(&self, result: BatchResult) {
        let mut state = self.inner.write();
        state.batch_results.push(result);
        cap(&mut state.batch_results, MAX_BATCH_HISTORY);
    }

    pub fn record_table_result(&self, result: TableSyncResult) {
        let mut state = self.inner.write();
        state.table_results.push(result);
        cap(&mut state.table_results, MAX_TABLE_HISTORY);
    }

    /// Copy of the full state for introspection callers.
    pub fn snapshot(&self) -> SyncState {
        self.inner.read().clone()
    }
}

fn cap<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewsync_core::SyncAction;

    fn batch_result(batch_id: usize) -> BatchResult {
        BatchResult {
            batch_id,
            total_meta_table_count: 0,
            invalid_meta_table_count: 0,
            need_created_count: 0,
            need_updated_count: 0,
            success_count: 0,
            error_count: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_last_sync_time_round_trip() {
        let store = SyncStateStore::new();
        assert!(store.last_sync_time().is_none());
        let t = Utc::now();
        store.set_last_sync_time(t);
        assert_eq!(store.last_sync_time(), Some(t));
    }

    #[test]
    fn test_batch_history_is_capped() {
        let store = SyncStateStore::new();
        for i in 0..(MAX_BATCH_HISTORY + 25) {
            store.record_batch(batch_result(i));
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.batch_results.len(), MAX_BATCH_HISTORY);
        // Oldest entries dropped, newest kept
        assert_eq!(snapshot.batch_results.first().unwrap().batch_id, 25);
        assert_eq!(
            snapshot.batch_results.last().unwrap().batch_id,
            MAX_BATCH_HISTORY + 24
        );
    }

    #[test]
    fn test_table_history_is_capped() {
        let store = SyncStateStore::new();
        for i in 0..(MAX_TABLE_HISTORY + 10) {
            store.record_table_result(TableSyncResult {
                view_id: i.to_string(),
                technical_name: format!("t{}", i),
                action: SyncAction::Created,
                synced_at: Utc::now(),
            });
        }
        assert_eq!(store.snapshot().table_results.len(), MAX_TABLE_HISTORY);
    }
}
