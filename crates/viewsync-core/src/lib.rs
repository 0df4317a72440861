//! ViewSync Core
//!
//! Core domain types for the ViewSync data view catalog: data sources,
//! scanned metadata tables, materialized views and view groups, and the
//! sync-state records kept by the reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod naming;

// ============================================================================
// Data Sources
// ============================================================================

/// Kind of external system a data source connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    /// Relational databases (MySQL, PostgreSQL, Oracle, ...)
    Relational,
    /// Document/search engines queried through a DSL
    DocumentSearch,
    /// Index bases scanned by a separate path; skipped by view sync
    IndexBase,
    /// Spreadsheet files registered as tabular sources
    Spreadsheet,
}

impl DataSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceType::Relational => "relational",
            DataSourceType::DocumentSearch => "document_search",
            DataSourceType::IndexBase => "index_base",
            DataSourceType::Spreadsheet => "spreadsheet",
        }
    }
}

impl std::fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataSourceType {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relational" => Ok(DataSourceType::Relational),
            "document_search" => Ok(DataSourceType::DocumentSearch),
            "index_base" => Ok(DataSourceType::IndexBase),
            "spreadsheet" => Ok(DataSourceType::Spreadsheet),
            _ => Err(SyncError::Validation(format!(
                "Unknown data source type: {}",
                s
            ))),
        }
    }
}

/// A registered data source. Owned by the external source directory;
/// read-only to the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    /// Unique identifier; builtin view groups reuse it as their group id
    pub id: String,
    /// Human-given connection name
    pub name: String,
    /// Kind of backing system
    pub source_type: DataSourceType,
    /// Identity of the account that registered the connection
    pub creator: String,
    /// Catalog component of the fully-qualified table reference
    pub catalog: String,
    /// Schema component; may be empty when the source only has a database
    pub schema: String,
    /// Database component, used when `schema` is empty
    pub database: String,
}

// ============================================================================
// Scanned Metadata
// ============================================================================

/// Cheap listing record for one scanned table, as returned by the
/// metadata catalog's time-filtered listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataTableRef {
    pub id: String,
    /// Technical table name
    pub name: String,
    pub update_time: DateTime<Utc>,
}

/// Identity of a scanned table within its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    /// Technical table name
    pub name: String,
    /// Table comment from the source system, if any
    pub description: String,
    pub update_time: DateTime<Utc>,
}

/// Connection details of the source owning a scanned table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub name: String,
    pub source_type: DataSourceType,
    pub catalog: String,
    pub schema: String,
    pub database: String,
}

/// Cell-range configuration for spreadsheet-backed tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub sheet: String,
    pub start_cell: String,
    pub end_cell: String,
    pub has_headers: bool,
    /// Source file the sheet was scanned from
    pub file_name: String,
}

/// One column of a scanned table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaField {
    pub name: String,
    pub comment: String,
    /// Resolved virtual data type; `None` when the scanner could not map
    /// the native type, which marks the field as not supported
    pub data_type: Option<String>,
    pub is_nullable: bool,
    pub primary_key: bool,
    pub data_length: Option<i64>,
    pub data_precision: Option<i64>,
}

/// Full detail record for one scanned table. The authoritative,
/// externally-owned truth a view is materialized from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataTable {
    pub table_id: String,
    /// `None` when the catalog returned a dangling record; such entries
    /// are counted as invalid and skipped
    pub table: Option<TableInfo>,
    pub source: SourceRef,
    pub fields: Vec<MetaField>,
    /// Present only for spreadsheet sources
    pub sheet: Option<SheetConfig>,
}

// ============================================================================
// Views
// ============================================================================

/// How a view is queried downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Sql,
    Dsl,
    IndexBase,
}

impl QueryType {
    /// Derive the query type from the owning source's kind
    pub fn for_source(source_type: DataSourceType) -> Self {
        match source_type {
            DataSourceType::DocumentSearch => QueryType::Dsl,
            DataSourceType::IndexBase => QueryType::IndexBase,
            _ => QueryType::Sql,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "sql",
            QueryType::Dsl => "dsl",
            QueryType::IndexBase => "index_base",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueryType {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sql" => Ok(QueryType::Sql),
            "dsl" => Ok(QueryType::Dsl),
            "index_base" => Ok(QueryType::IndexBase),
            _ => Err(SyncError::Validation(format!("Unknown query type: {}", s))),
        }
    }
}

/// Atomic views mirror one scanned table; custom views are user-composed
/// expressions and are never touched by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Atomic,
    Custom,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Atomic => "atomic",
            ViewType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ViewType {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "atomic" => Ok(ViewType::Atomic),
            "custom" => Ok(ViewType::Custom),
            _ => Err(SyncError::Validation(format!("Unknown view type: {}", s))),
        }
    }
}

/// Scan status of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// Materialized for the first time this cycle
    New,
    /// Field shape changed since the last materialization
    Modify,
    /// Backing table unchanged
    NoChange,
    /// No field of the backing table has a supported type
    NotSupported,
    /// Backing table no longer exists upstream; terminal
    SourceDeleted,
}

impl ViewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewStatus::New => "new",
            ViewStatus::Modify => "modify",
            ViewStatus::NoChange => "no_change",
            ViewStatus::NotSupported => "not_supported",
            ViewStatus::SourceDeleted => "source_deleted",
        }
    }
}

impl std::fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ViewStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(ViewStatus::New),
            "modify" => Ok(ViewStatus::Modify),
            "no_change" => Ok(ViewStatus::NoChange),
            "not_supported" => Ok(ViewStatus::NotSupported),
            "source_deleted" => Ok(ViewStatus::SourceDeleted),
            _ => Err(SyncError::Validation(format!("Unknown view status: {}", s))),
        }
    }
}

/// Scan status of a single view field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    New,
    Modify,
    NotSupported,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::New => "new",
            FieldStatus::Modify => "modify",
            FieldStatus::NotSupported => "not_supported",
        }
    }
}

impl std::fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FieldStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(FieldStatus::New),
            "modify" => Ok(FieldStatus::Modify),
            "not_supported" => Ok(FieldStatus::NotSupported),
            _ => Err(SyncError::Validation(format!(
                "Unknown field status: {}",
                s
            ))),
        }
    }
}

/// One column of a materialized view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewField {
    pub name: String,
    /// Display name, deduplicated within the owning table
    pub display_name: String,
    /// Technical column name as scanned
    pub original_name: String,
    pub comment: String,
    /// `None` for fields whose native type could not be resolved
    pub data_type: Option<String>,
    pub is_nullable: bool,
    pub data_length: Option<i64>,
    pub data_precision: Option<i64>,
    pub primary_key: bool,
    pub status: FieldStatus,
}

impl ViewField {
    /// Structural equality: the attributes that come from the scanned
    /// table, ignoring user-editable surfaces (display name, comment)
    /// and scan status.
    pub fn same_shape(&self, other: &ViewField) -> bool {
        self.name == other.name
            && self.original_name == other.original_name
            && self.data_type == other.data_type
            && self.is_nullable == other.is_nullable
            && self.data_length == other.data_length
            && self.data_precision == other.data_precision
            && self.primary_key == other.primary_key
    }
}

/// A materialized catalog entry for one scanned table (atomic views) or a
/// user-composed expression (custom views).
///
/// For atomic views `view_id` equals the originating metadata table id.
/// That anchor is what makes reconciliation idempotent: re-materializing
/// an unchanged table never mints a new identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub view_id: String,
    /// Technical name of the backing table
    pub technical_name: String,
    /// Display name, deduplicated within the live views of the source
    pub view_name: String,
    pub group_id: String,
    pub group_name: String,
    pub view_type: ViewType,
    pub query_type: QueryType,
    pub source_id: String,
    pub source_type: DataSourceType,
    pub fields: Vec<ViewField>,
    pub status: ViewStatus,
    /// Set when the view is soft-deleted; never hard-deleted by the engine
    pub delete_time: Option<DateTime<Utc>>,
    /// Generated `SELECT * FROM <ref>` for SQL query types
    pub sql_str: Option<String>,
    /// Fully-qualified `catalog."schema"."table"` reference
    pub qualified_name: String,
    pub primary_keys: Vec<String>,
    pub comment: String,
    pub builtin: bool,
    /// Present for spreadsheet-backed views
    pub sheet: Option<SheetConfig>,
}

impl View {
    /// A view is live until its backing table disappears upstream
    pub fn is_live(&self) -> bool {
        self.status != ViewStatus::SourceDeleted
    }
}

/// A named container of views; builtin groups map 1:1 onto data sources
/// (`group_id == DataSource::id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewGroup {
    pub group_id: String,
    pub group_name: String,
    pub builtin: bool,
}

// ============================================================================
// Sync State
// ============================================================================

/// Full vs. incremental reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Consider all metadata regardless of timestamp
    Full,
    /// Only metadata updated since the last successful cycle
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            _ => Err(SyncError::Validation(format!("Unknown sync mode: {}", s))),
        }
    }
}

/// What happened to one table during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
    SourceDeleted,
}

/// Per-table sync history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSyncResult {
    pub view_id: String,
    pub technical_name: String,
    pub action: SyncAction,
    pub synced_at: DateTime<Utc>,
}

/// Counters for one processed batch of metadata tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: usize,
    pub total_meta_table_count: usize,
    /// Records whose table detail was missing from the catalog
    pub invalid_meta_table_count: usize,
    pub need_created_count: usize,
    pub need_updated_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot of the engine's persisted progress and bounded history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Start time of the last cycle in which every source succeeded;
    /// `None` means never synced and forces a full cycle
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Most recent batch results, oldest dropped past the cap
    pub batch_results: Vec<BatchResult>,
    /// Most recent per-table results, oldest dropped past the cap
    pub table_results: Vec<TableSyncResult>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the sync engine and its stores
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failure calling the source directory or metadata catalog
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Failure calling the view or group store
    #[error("Store error: {0}")]
    Store(String),

    /// Malformed input that cannot be repaired in place
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cycle was interrupted by a shutdown request
    #[error("Sync cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
