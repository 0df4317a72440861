//! Test Utilities Module
//!
//! In-memory fakes of the engine's four collaborators plus fixture
//! builders, shared by the integration tests. Enable via the
//! `test-utils` feature flag.
//!
//! The store fakes count mutation calls so tests can assert on exactly
//! how many writes a cycle performed (idempotence means a repeat cycle
//! performs none), and the catalog fake can be told to fail for chosen
//! sources to exercise fault isolation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use viewsync_core::{
    DataSource, DataSourceType, MetaField, MetadataTable, MetadataTableRef, Result, SourceRef,
    SyncError, TableInfo, View, ViewGroup, ViewStatus,
};

use crate::traits::{DataSourceDirectory, GroupStore, MetadataCatalog, ViewStore};

/// Initialize tracing for tests. Safe to call repeatedly; respects
/// `RUST_LOG`.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn data_source(id: &str, name: &str, source_type: DataSourceType) -> DataSource {
    DataSource {
        id: id.to_string(),
        name: name.to_string(),
        source_type,
        creator: "admin".to_string(),
        catalog: "hive".to_string(),
        schema: "main".to_string(),
        database: "maindb".to_string(),
    }
}

pub fn meta_field(name: &str, data_type: &str) -> MetaField {
    MetaField {
        name: name.to_string(),
        comment: String::new(),
        data_type: Some(data_type.to_string()),
        is_nullable: true,
        primary_key: false,
        data_length: None,
        data_precision: None,
    }
}

pub fn meta_table(
    source: &DataSource,
    table_id: &str,
    name: &str,
    fields: Vec<MetaField>,
) -> MetadataTable {
    meta_table_at(source, table_id, name, fields, Utc::now())
}

pub fn meta_table_at(
    source: &DataSource,
    table_id: &str,
    name: &str,
    fields: Vec<MetaField>,
    update_time: DateTime<Utc>,
) -> MetadataTable {
    MetadataTable {
        table_id: table_id.to_string(),
        table: Some(TableInfo {
            id: table_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            update_time,
        }),
        source: SourceRef {
            id: source.id.clone(),
            name: source.name.clone(),
            source_type: source.source_type,
            catalog: source.catalog.clone(),
            schema: source.schema.clone(),
            database: source.database.clone(),
        },
        fields,
        sheet: None,
    }
}

// ============================================================================
// Directory Fake
// ============================================================================

#[derive(Default)]
pub struct MemoryDirectory {
    sources: RwLock<Vec<DataSource>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sources(&self, sources: Vec<DataSource>) {
        *self.sources.write() = sources;
    }
}

#[async_trait]
impl DataSourceDirectory for MemoryDirectory {
    async fn list(&self) -> Result<Vec<DataSource>> {
        Ok(self.sources.read().clone())
    }
}

// ============================================================================
// Catalog Fake
// ============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<HashMap<String, Vec<MetadataTable>>>,
    failing_sources: RwLock<HashSet<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scanned tables of one source.
    pub fn set_tables(&self, source_id: &str, tables: Vec<MetadataTable>) {
        self.tables.write().insert(source_id.to_string(), tables);
    }

    /// Make listings for this source fail until cleared.
    pub fn fail_source(&self, source_id: &str) {
        self.failing_sources.write().insert(source_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_sources.write().clear();
    }
}

#[async_trait]
impl MetadataCatalog for MemoryCatalog {
    async fn list_tables_by_source(
        &self,
        source_id: &str,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetadataTableRef>> {
        if self.failing_sources.read().contains(source_id) {
            return Err(SyncError::Upstream(format!(
                "metadata catalog unavailable for source '{}'",
                source_id
            )));
        }

        let tables = self.tables.read();
        let refs = tables
            .get(source_id)
            .map(|list| {
                list.iter()
                    .filter_map(|t| t.table.as_ref())
                    .filter(|info| updated_since.map_or(true, |since| info.update_time >= since))
                    .map(|info| MetadataTableRef {
                        id: info.id.clone(),
                        name: info.name.clone(),
                        update_time: info.update_time,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(refs)
    }

    async fn get_tables_by_ids(&self, ids: &[String]) -> Result<Vec<MetadataTable>> {
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let tables = self.tables.read();
        Ok(tables
            .values()
            .flatten()
            .filter(|t| wanted.contains(t.table_id.as_str()))
            .cloned()
            .collect())
    }
}

// ============================================================================
// View Store Fake
// ============================================================================

#[derive(Default)]
pub struct MemoryViewStore {
    views: RwLock<HashMap<String, View>>,
    insert_calls: AtomicUsize,
    update_calls: AtomicUsize,
    mark_deleted_calls: AtomicUsize,
}

impl MemoryViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn mark_deleted_calls(&self) -> usize {
        self.mark_deleted_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.insert_calls() + self.update_calls() + self.mark_deleted_calls()
    }

    pub fn get(&self, view_id: &str) -> Option<View> {
        self.views.read().get(view_id).cloned()
    }

    pub fn by_technical_name(&self, source_id: &str, technical_name: &str) -> Option<View> {
        self.views
            .read()
            .values()
            .find(|v| v.source_id == source_id && v.technical_name == technical_name)
            .cloned()
    }

    pub fn all(&self) -> Vec<View> {
        self.views.read().values().cloned().collect()
    }

    /// Insert a view directly, bypassing the call counters.
    pub fn seed_view(&self, view: View) {
        self.views.write().insert(view.view_id.clone(), view);
    }

    /// Overwrite a stored view directly (e.g. to simulate a user edit).
    pub fn patch_view<F: FnOnce(&mut View)>(&self, view_id: &str, patch: F) {
        if let Some(view) = self.views.write().get_mut(view_id) {
            patch(view);
        }
    }

    fn mark_group_views_deleted(&self, group_id: &str) {
        let now = Utc::now();
        for view in self.views.write().values_mut() {
            if view.group_id == group_id && view.status != ViewStatus::SourceDeleted {
                view.status = ViewStatus::SourceDeleted;
                view.delete_time = Some(now);
            }
        }
    }
}

#[async_trait]
impl ViewStore for MemoryViewStore {
    async fn views_by_source(&self, source_id: &str) -> Result<Vec<View>> {
        Ok(self
            .views
            .read()
            .values()
            .filter(|v| v.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn exists_by_name(&self, source_id: &str, view_name: &str) -> Result<bool> {
        Ok(self
            .views
            .read()
            .values()
            .any(|v| v.source_id == source_id && v.view_name == view_name && v.is_live()))
    }

    async fn insert(&self, views: &[View]) -> Result<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.views.write();
        for view in views {
            store.insert(view.view_id.clone(), view.clone());
        }
        Ok(())
    }

    async fn update(&self, view: &View) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.views
            .write()
            .insert(view.view_id.clone(), view.clone());
        Ok(())
    }

    async fn mark_deleted(&self, view_ids: &[String]) -> Result<()> {
        self.mark_deleted_calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut store = self.views.write();
        for id in view_ids {
            if let Some(view) = store.get_mut(id) {
                view.status = ViewStatus::SourceDeleted;
                view.delete_time = Some(now);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Group Store Fake
// ============================================================================

#[derive(Default)]
pub struct MemoryGroupStore {
    groups: RwLock<HashMap<String, ViewGroup>>,
    deleted: RwLock<Vec<(String, bool)>>,
    views: Option<Arc<MemoryViewStore>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a view store so cascading deletes reach its views, the way
    /// the real store transitions group and views together.
    pub fn with_views(views: Arc<MemoryViewStore>) -> Self {
        Self {
            views: Some(views),
            ..Self::default()
        }
    }

    pub fn seed_group(&self, group: ViewGroup) {
        self.groups.write().insert(group.group_id.clone(), group);
    }

    pub fn get(&self, group_id: &str) -> Option<ViewGroup> {
        self.groups.read().get(group_id).cloned()
    }

    /// Deletions recorded as `(group_id, cascade_views)`.
    pub fn deletions(&self) -> Vec<(String, bool)> {
        self.deleted.read().clone()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn list_builtin_groups(&self) -> Result<Vec<ViewGroup>> {
        Ok(self
            .groups
            .read()
            .values()
            .filter(|g| g.builtin)
            .cloned()
            .collect())
    }

    async fn create(&self, group: &ViewGroup) -> Result<()> {
        self.groups
            .write()
            .insert(group.group_id.clone(), group.clone());
        Ok(())
    }

    async fn rename(&self, group_id: &str, group_name: &str) -> Result<()> {
        if let Some(group) = self.groups.write().get_mut(group_id) {
            group.group_name = group_name.to_string();
        }
        Ok(())
    }

    async fn mark_deleted(&self, group_id: &str, cascade_views: bool) -> Result<()> {
        self.groups.write().remove(group_id);
        self.deleted
            .write()
            .push((group_id.to_string(), cascade_views));
        if cascade_views {
            if let Some(views) = &self.views {
                views.mark_group_views_deleted(group_id);
            }
        }
        Ok(())
    }
}
