//! Prometheus metrics for the sync engine
//!
//! This module is only compiled when the `metrics` feature is enabled.
//!
//! Exposed metrics:
//! - `viewsync_cycles_total` - Counter for completed cycles by mode/outcome
//! - `viewsync_cycle_duration_seconds` - Histogram of cycle latency
//! - `viewsync_views_created_total` - Counter for materialized views
//! - `viewsync_views_updated_total` - Counter for re-materialized views
//! - `viewsync_views_source_deleted_total` - Counter for soft deletes

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Histogram,
};
use viewsync_core::SyncMode;

use crate::source::SourceOutcome;

lazy_static! {
    /// Completed reconciliation cycles by mode and outcome
    pub static ref SYNC_CYCLES_TOTAL: CounterVec = register_counter_vec!(
        "viewsync_cycles_total",
        "Total number of completed sync cycles",
        &["mode", "outcome"]
    )
    .unwrap();

    /// Cycle latency in seconds
    pub static ref SYNC_CYCLE_DURATION_SECONDS: Histogram = register_histogram!(
        "viewsync_cycle_duration_seconds",
        "Sync cycle latency in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]
    )
    .unwrap();

    /// Views materialized for the first time
    pub static ref VIEWS_CREATED_TOTAL: Counter = register_counter!(
        "viewsync_views_created_total",
        "Total number of views created by sync"
    )
    .unwrap();

    /// Views re-materialized after a field change
    pub static ref VIEWS_UPDATED_TOTAL: Counter = register_counter!(
        "viewsync_views_updated_total",
        "Total number of views updated by sync"
    )
    .unwrap();

    /// Views transitioned to source-deleted
    pub static ref VIEWS_SOURCE_DELETED_TOTAL: Counter = register_counter!(
        "viewsync_views_source_deleted_total",
        "Total number of views marked source deleted by sync"
    )
    .unwrap();
}

pub fn record_cycle(mode: SyncMode, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "partial_failure" };
    SYNC_CYCLES_TOTAL
        .with_label_values(&[mode.as_str(), outcome])
        .inc();
    SYNC_CYCLE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_source_outcome(outcome: &SourceOutcome) {
    VIEWS_CREATED_TOTAL.inc_by(outcome.created as f64);
    VIEWS_UPDATED_TOTAL.inc_by(outcome.updated as f64);
    VIEWS_SOURCE_DELETED_TOTAL.inc_by(outcome.source_deleted as f64);
}
