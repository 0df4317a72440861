//! ViewSync Store
//!
//! SQLite-backed persistence for views and view groups. Implements the
//! engine's `ViewStore`/`GroupStore` traits: inserts are upserts keyed on
//! the stable view id, updates replace the field list wholesale inside a
//! transaction, and deletion is always a soft status transition — rows
//! are never removed.
//!
//! The connection lives behind a `parking_lot::Mutex` and is never held
//! across an await point.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;
use viewsync_core::{
    DataSourceType, FieldStatus, QueryType, Result, SheetConfig, SyncError, View, ViewField,
    ViewGroup, ViewStatus, ViewType,
};
use viewsync_engine::traits::{GroupStore, ViewStore};

/// Initialize the SQLite schema for the view catalog
///
/// Creates all necessary tables if they don't exist:
/// - `views`: materialized view registry
/// - `view_fields`: column-level detail, ordered by position
/// - `view_groups`: builtin and custom view groups
pub fn init_sqlite_schema(conn: &Connection) -> Result<()> {
    let ddl = r#"
    CREATE TABLE IF NOT EXISTS views (
      view_id TEXT PRIMARY KEY,
      technical_name TEXT NOT NULL,
      view_name TEXT NOT NULL,
      group_id TEXT NOT NULL,
      group_name TEXT NOT NULL,
      view_type TEXT NOT NULL,
      query_type TEXT NOT NULL,
      source_id TEXT NOT NULL,
      source_type TEXT NOT NULL,
      status TEXT NOT NULL,
      delete_time TEXT,
      sql_str TEXT,
      qualified_name TEXT NOT NULL,
      primary_keys TEXT NOT NULL DEFAULT '[]',
      comment TEXT NOT NULL DEFAULT '',
      builtin INTEGER NOT NULL DEFAULT 1,
      sheet_config TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_views_source ON views(source_id);
    CREATE INDEX IF NOT EXISTS idx_views_group ON views(group_id);

    CREATE TABLE IF NOT EXISTS view_fields (
      view_id TEXT NOT NULL REFERENCES views(view_id) ON DELETE CASCADE,
      position INTEGER NOT NULL,
      name TEXT NOT NULL,
      display_name TEXT NOT NULL,
      original_name TEXT NOT NULL,
      comment TEXT NOT NULL DEFAULT '',
      data_type TEXT,
      is_nullable INTEGER NOT NULL,
      data_length INTEGER,
      data_precision INTEGER,
      primary_key INTEGER NOT NULL,
      status TEXT NOT NULL,
      PRIMARY KEY (view_id, position)
    );

    CREATE TABLE IF NOT EXISTS view_groups (
      group_id TEXT PRIMARY KEY,
      group_name TEXT NOT NULL,
      builtin INTEGER NOT NULL DEFAULT 0,
      deleted INTEGER NOT NULL DEFAULT 0,
      delete_time TEXT
    );
    "#;

    conn.execute_batch(ddl).map_err(db_err)?;
    Ok(())
}

/// SQLite implementation of the view and group stores.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    /// Open (creating if needed) a catalog database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory catalog, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        init_sqlite_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn upsert_view(tx: &rusqlite::Transaction<'_>, view: &View) -> Result<()> {
        let primary_keys = serde_json::to_string(&view.primary_keys)?;
        let sheet_config = view
            .sheet
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            r#"
            INSERT INTO views (
                view_id, technical_name, view_name, group_id, group_name,
                view_type, query_type, source_id, source_type, status,
                delete_time, sql_str, qualified_name, primary_keys, comment,
                builtin, sheet_config
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(view_id) DO UPDATE SET
                technical_name = excluded.technical_name,
                view_name = excluded.view_name,
                group_id = excluded.group_id,
                group_name = excluded.group_name,
                view_type = excluded.view_type,
                query_type = excluded.query_type,
                source_id = excluded.source_id,
                source_type = excluded.source_type,
                status = excluded.status,
                delete_time = excluded.delete_time,
                sql_str = excluded.sql_str,
                qualified_name = excluded.qualified_name,
                primary_keys = excluded.primary_keys,
                comment = excluded.comment,
                builtin = excluded.builtin,
                sheet_config = excluded.sheet_config
            "#,
            params![
                view.view_id,
                view.technical_name,
                view.view_name,
                view.group_id,
                view.group_name,
                view.view_type.as_str(),
                view.query_type.as_str(),
                view.source_id,
                view.source_type.as_str(),
                view.status.as_str(),
                view.delete_time.map(|t| t.to_rfc3339()),
                view.sql_str,
                view.qualified_name,
                primary_keys,
                view.comment,
                view.builtin as i32,
                sheet_config,
            ],
        )
        .map_err(db_err)?;

        // Fields are replaced wholesale
        tx.execute("DELETE FROM view_fields WHERE view_id = ?1", [&view.view_id])
            .map_err(db_err)?;
        for (position, field) in view.fields.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO view_fields (
                    view_id, position, name, display_name, original_name,
                    comment, data_type, is_nullable, data_length,
                    data_precision, primary_key, status
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    view.view_id,
                    position as i64,
                    field.name,
                    field.display_name,
                    field.original_name,
                    field.comment,
                    field.data_type,
                    field.is_nullable as i32,
                    field.data_length,
                    field.data_precision,
                    field.primary_key as i32,
                    field.status.as_str(),
                ],
            )
            .map_err(db_err)?;
        }

        Ok(())
    }

    fn load_fields(conn: &Connection, view_id: &str) -> Result<Vec<ViewField>> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT name, display_name, original_name, comment, data_type,
                       is_nullable, data_length, data_precision, primary_key, status
                FROM view_fields
                WHERE view_id = ?1
                ORDER BY position
                "#,
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([view_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, bool>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(
                |(
                    name,
                    display_name,
                    original_name,
                    comment,
                    data_type,
                    is_nullable,
                    data_length,
                    data_precision,
                    primary_key,
                    status,
                )| {
                    Ok(ViewField {
                        name,
                        display_name,
                        original_name,
                        comment,
                        data_type,
                        is_nullable,
                        data_length,
                        data_precision,
                        primary_key,
                        status: FieldStatus::from_str(&status)?,
                    })
                },
            )
            .collect()
    }
}

#[async_trait]
impl ViewStore for SqliteCatalogStore {
    async fn views_by_source(&self, source_id: &str) -> Result<Vec<View>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT view_id, technical_name, view_name, group_id, group_name,
                       view_type, query_type, source_id, source_type, status,
                       delete_time, sql_str, qualified_name, primary_keys,
                       comment, builtin, sheet_config
                FROM views
                WHERE source_id = ?1
                "#,
            )
            .map_err(db_err)?;

        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
            String,
            bool,
            Option<String>,
        )> = stmt
            .query_map([source_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                    row.get(12)?,
                    row.get(13)?,
                    row.get(14)?,
                    row.get(15)?,
                    row.get(16)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        drop(stmt);

        let mut views = Vec::with_capacity(rows.len());
        for (
            view_id,
            technical_name,
            view_name,
            group_id,
            group_name,
            view_type,
            query_type,
            source_id,
            source_type,
            status,
            delete_time,
            sql_str,
            qualified_name,
            primary_keys,
            comment,
            builtin,
            sheet_config,
        ) in rows
        {
            let fields = Self::load_fields(&conn, &view_id)?;
            views.push(View {
                fields,
                technical_name,
                view_name,
                group_id,
                group_name,
                view_type: ViewType::from_str(&view_type)?,
                query_type: QueryType::from_str(&query_type)?,
                source_id,
                source_type: DataSourceType::from_str(&source_type)?,
                status: ViewStatus::from_str(&status)?,
                delete_time: parse_time(delete_time)?,
                sql_str,
                qualified_name,
                primary_keys: serde_json::from_str(&primary_keys)?,
                comment,
                builtin,
                sheet: sheet_config
                    .map(|s| serde_json::from_str::<SheetConfig>(&s))
                    .transpose()?,
                view_id,
            });
        }

        Ok(views)
    }

    async fn exists_by_name(&self, source_id: &str, view_name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                r#"
                SELECT COUNT(*) FROM views
                WHERE source_id = ?1 AND view_name = ?2 AND status != 'source_deleted'
                "#,
                params![source_id, view_name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn insert(&self, views: &[View]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        for view in views {
            Self::upsert_view(&tx, view)?;
        }
        tx.commit().map_err(db_err)?;
        debug!(count = views.len(), "inserted views");
        Ok(())
    }

    async fn update(&self, view: &View) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        Self::upsert_view(&tx, view)?;
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    async fn mark_deleted(&self, view_ids: &[String]) -> Result<()> {
        if view_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        for view_id in view_ids {
            tx.execute(
                r#"
                UPDATE views
                SET status = 'source_deleted', delete_time = ?1
                WHERE view_id = ?2 AND status != 'source_deleted'
                "#,
                params![now, view_id],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        debug!(count = view_ids.len(), "marked views source deleted");
        Ok(())
    }
}

#[async_trait]
impl GroupStore for SqliteCatalogStore {
    async fn list_builtin_groups(&self) -> Result<Vec<ViewGroup>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT group_id, group_name, builtin FROM view_groups WHERE builtin = 1 AND deleted = 0",
            )
            .map_err(db_err)?;
        let groups = stmt
            .query_map([], |row| {
                Ok(ViewGroup {
                    group_id: row.get(0)?,
                    group_name: row.get(1)?,
                    builtin: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(groups)
    }

    async fn create(&self, group: &ViewGroup) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO view_groups (group_id, group_name, builtin, deleted, delete_time)
            VALUES (?1, ?2, ?3, 0, NULL)
            ON CONFLICT(group_id) DO UPDATE SET
                group_name = excluded.group_name,
                builtin = excluded.builtin,
                deleted = 0,
                delete_time = NULL
            "#,
            params![group.group_id, group.group_name, group.builtin as i32],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn rename(&self, group_id: &str, group_name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE view_groups SET group_name = ?1 WHERE group_id = ?2",
            params![group_name, group_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_deleted(&self, group_id: &str, cascade_views: bool) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE view_groups SET deleted = 1, delete_time = ?1 WHERE group_id = ?2",
            params![now, group_id],
        )
        .map_err(db_err)?;

        if cascade_views {
            tx.execute(
                r#"
                UPDATE views
                SET status = 'source_deleted', delete_time = ?1
                WHERE group_id = ?2 AND status != 'source_deleted'
                "#,
                params![now, group_id],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        debug!(group_id, cascade_views, "marked view group deleted");
        Ok(())
    }
}

fn db_err(e: rusqlite::Error) -> SyncError {
    SyncError::Store(e.to_string())
}

fn parse_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| SyncError::Store(format!("invalid timestamp '{}': {}", s, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_field(name: &str, data_type: &str) -> ViewField {
        ViewField {
            name: name.to_string(),
            display_name: name.to_string(),
            original_name: name.to_string(),
            comment: String::new(),
            data_type: Some(data_type.to_string()),
            is_nullable: true,
            data_length: None,
            data_precision: None,
            primary_key: false,
            status: FieldStatus::New,
        }
    }

    fn sample_view(view_id: &str, technical_name: &str) -> View {
        View {
            view_id: view_id.to_string(),
            technical_name: technical_name.to_string(),
            view_name: technical_name.to_string(),
            group_id: "ds-1".to_string(),
            group_name: "warehouse".to_string(),
            view_type: ViewType::Atomic,
            query_type: QueryType::Sql,
            source_id: "ds-1".to_string(),
            source_type: viewsync_core::DataSourceType::Relational,
            fields: vec![sample_field("id", "bigint"), sample_field("name", "varchar")],
            status: ViewStatus::New,
            delete_time: None,
            sql_str: Some(format!("SELECT * FROM hive.\"main\".\"{}\"", technical_name)),
            qualified_name: format!("hive.\"main\".\"{}\"", technical_name),
            primary_keys: vec!["id".to_string()],
            comment: String::new(),
            builtin: true,
            sheet: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .insert(&[sample_view("v1", "orders"), sample_view("v2", "customers")])
            .await
            .unwrap();

        let mut views = store.views_by_source("ds-1").await.unwrap();
        views.sort_by(|a, b| a.view_id.cmp(&b.view_id));
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].view_id, "v1");
        assert_eq!(views[0].fields.len(), 2);
        assert_eq!(views[0].fields[0].name, "id");
        assert_eq!(views[0].primary_keys, vec!["id".to_string()]);
        assert_eq!(views[0].status, ViewStatus::New);
        assert_eq!(views[0].query_type, QueryType::Sql);
    }

    #[tokio::test]
    async fn test_insert_same_id_is_upsert() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.insert(&[sample_view("v1", "orders")]).await.unwrap();

        let mut renamed = sample_view("v1", "orders");
        renamed.view_name = "Orders".to_string();
        store.insert(&[renamed]).await.unwrap();

        let views = store.views_by_source("ds-1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].view_name, "Orders");
    }

    #[tokio::test]
    async fn test_update_replaces_fields_wholesale() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.insert(&[sample_view("v1", "orders")]).await.unwrap();

        let mut shrunk = sample_view("v1", "orders");
        shrunk.fields = vec![sample_field("id", "bigint")];
        shrunk.status = ViewStatus::Modify;
        store.update(&shrunk).await.unwrap();

        let views = store.views_by_source("ds-1").await.unwrap();
        assert_eq!(views[0].fields.len(), 1);
        assert_eq!(views[0].status, ViewStatus::Modify);
    }

    #[tokio::test]
    async fn test_mark_deleted_is_soft() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.insert(&[sample_view("v1", "orders")]).await.unwrap();

        ViewStore::mark_deleted(&store, &["v1".to_string()])
            .await
            .unwrap();

        let views = store.views_by_source("ds-1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, ViewStatus::SourceDeleted);
        assert!(views[0].delete_time.is_some());
    }

    #[tokio::test]
    async fn test_exists_by_name_ignores_deleted() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.insert(&[sample_view("v1", "orders")]).await.unwrap();

        assert!(store.exists_by_name("ds-1", "orders").await.unwrap());
        assert!(!store.exists_by_name("ds-1", "missing").await.unwrap());

        ViewStore::mark_deleted(&store, &["v1".to_string()])
            .await
            .unwrap();
        assert!(!store.exists_by_name("ds-1", "orders").await.unwrap());
    }

    #[tokio::test]
    async fn test_sheet_config_round_trip() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let mut view = sample_view("v1", "budget");
        view.sheet = Some(SheetConfig {
            sheet: "Q1".to_string(),
            start_cell: "A1".to_string(),
            end_cell: "F200".to_string(),
            has_headers: true,
            file_name: "budget.xlsx".to_string(),
        });
        store.insert(&[view]).await.unwrap();

        let views = store.views_by_source("ds-1").await.unwrap();
        let sheet = views[0].sheet.as_ref().unwrap();
        assert_eq!(sheet.sheet, "Q1");
        assert!(sheet.has_headers);
    }

    #[tokio::test]
    async fn test_group_lifecycle_and_cascade() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .create(&ViewGroup {
                group_id: "ds-1".to_string(),
                group_name: "warehouse".to_string(),
                builtin: true,
            })
            .await
            .unwrap();
        store.insert(&[sample_view("v1", "orders")]).await.unwrap();

        let groups = store.list_builtin_groups().await.unwrap();
        assert_eq!(groups.len(), 1);

        store.rename("ds-1", "warehouse prod").await.unwrap();
        let groups = store.list_builtin_groups().await.unwrap();
        assert_eq!(groups[0].group_name, "warehouse prod");

        // Cascade delete transitions the group's views in the same call
        GroupStore::mark_deleted(&store, "ds-1", true).await.unwrap();
        assert!(store.list_builtin_groups().await.unwrap().is_empty());
        let views = store.views_by_source("ds-1").await.unwrap();
        assert_eq!(views[0].status, ViewStatus::SourceDeleted);
    }

    #[tokio::test]
    async fn test_recreated_group_clears_deletion() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let group = ViewGroup {
            group_id: "ds-1".to_string(),
            group_name: "warehouse".to_string(),
            builtin: true,
        };
        store.create(&group).await.unwrap();
        GroupStore::mark_deleted(&store, "ds-1", false).await.unwrap();
        assert!(store.list_builtin_groups().await.unwrap().is_empty());

        store.create(&group).await.unwrap();
        assert_eq!(store.list_builtin_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_on_disk_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");

        {
            let store = SqliteCatalogStore::open(&path).unwrap();
            store.insert(&[sample_view("v1", "orders")]).await.unwrap();
        }

        let store = SqliteCatalogStore::open(&path).unwrap();
        let views = store.views_by_source("ds-1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].technical_name, "orders");
    }
}
