//! Collaborator interfaces consumed by the sync engine.
//!
//! All four live outside this crate in production: the directory and the
//! metadata catalog belong to other services, the stores to the
//! persistence layer. The engine only ever talks to these traits, which
//! keeps every reconciliation path testable against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use viewsync_core::{DataSource, MetadataTable, MetadataTableRef, Result, View, ViewGroup};

/// Registry of configured data sources. Read-only to the engine.
#[async_trait]
pub trait DataSourceDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<DataSource>>;
}

/// Registry of scanned table metadata, produced by the scanning
/// subsystem. Read-only to the engine.
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// List table refs for a source, optionally restricted to tables
    /// updated at or after `updated_since`. `None` lists everything.
    async fn list_tables_by_source(
        &self,
        source_id: &str,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetadataTableRef>>;

    /// Fetch full table detail for known ids. Dangling records come back
    /// with `table: None` and are counted as invalid by the caller.
    async fn get_tables_by_ids(&self, ids: &[String]) -> Result<Vec<MetadataTable>>;
}

/// Persistence for materialized views.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Every view of the source, including soft-deleted ones.
    async fn views_by_source(&self, source_id: &str) -> Result<Vec<View>>;

    /// Whether a live view with this display name exists in the source.
    async fn exists_by_name(&self, source_id: &str, view_name: &str) -> Result<bool>;

    async fn insert(&self, views: &[View]) -> Result<()>;

    /// Upsert one view, replacing its field list wholesale.
    async fn update(&self, view: &View) -> Result<()>;

    /// Transition the given views to `SourceDeleted`. Never removes rows.
    async fn mark_deleted(&self, view_ids: &[String]) -> Result<()>;
}

/// Persistence for view groups.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn list_builtin_groups(&self) -> Result<Vec<ViewGroup>>;

    async fn create(&self, group: &ViewGroup) -> Result<()>;

    async fn rename(&self, group_id: &str, group_name: &str) -> Result<()>;

    /// Soft-delete a group; with `cascade_views` the group's views are
    /// transitioned in the same store operation, so a partial failure
    /// cannot leave the group deleted but its views live.
    async fn mark_deleted(&self, group_id: &str, cascade_views: bool) -> Result<()>;
}
