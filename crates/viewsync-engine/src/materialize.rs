//! View materialization: one scanned metadata table in, one complete
//! view entity out.
//!
//! Two paths exist. [`build_view`] materializes a table that has no view
//! yet and allocates fresh display names. [`build_updated_view`] rebuilds
//! an existing view's field list wholesale from the latest metadata while
//! preserving the surfaces users may have edited: the view name, the view
//! comment, and the display names/comments of surviving fields.

use std::collections::HashMap;

use tracing::warn;
use viewsync_core::naming::{truncate_chars, MAX_COMMENT_CHARS};
use viewsync_core::{
    FieldStatus, MetaField, MetadataTable, QueryType, Result, SourceRef, SyncError, View,
    ViewField, ViewStatus, ViewType,
};

use crate::names::NameAllocator;

/// Materialize a new atomic view from a scanned table.
///
/// `view_names` is the display-name scope of the owning data source. A
/// field whose type could not be resolved is carried as `NotSupported`
/// rather than rejecting the whole table.
pub fn build_view(table: &MetadataTable, view_names: &mut NameAllocator) -> Result<View> {
    let info = table_info(table)?;

    let mut field_names = NameAllocator::new();
    let mut fields = Vec::with_capacity(table.fields.len());
    let mut primary_keys = Vec::new();

    for meta_field in &table.fields {
        let display_name = field_names.resolve(&meta_field.comment, &meta_field.name, &meta_field.name);
        let comment = truncate_chars(&meta_field.comment, MAX_COMMENT_CHARS);
        fields.push(make_field(info.name.as_str(), meta_field, display_name, comment, FieldStatus::New));
        if meta_field.primary_key {
            primary_keys.push(meta_field.name.clone());
        }
    }

    let view_name = view_names.resolve(&info.description, &info.name, &table.table_id);
    let query_type = QueryType::for_source(table.source.source_type);
    let qualified = qualified_name(&table.source, &info.name);
    let sql_str = generate_sql(query_type, &qualified, &fields);

    Ok(View {
        view_id: table.table_id.clone(),
        technical_name: info.name.clone(),
        view_name,
        group_id: table.source.id.clone(),
        group_name: table.source.name.clone(),
        view_type: ViewType::Atomic,
        query_type,
        source_id: table.source.id.clone(),
        source_type: table.source.source_type,
        status: scan_status(&fields, ViewStatus::New),
        delete_time: None,
        sql_str,
        qualified_name: qualified,
        primary_keys,
        comment: truncate_chars(&info.description, MAX_COMMENT_CHARS),
        builtin: true,
        sheet: table.sheet.clone(),
        fields,
    })
}

/// Rebuild an existing view from the latest metadata.
///
/// The field list is replaced wholesale in scan order. Fields that
/// survive keep their display name and comment; new fields allocate
/// display names against the table scope seeded with the existing ones.
pub fn build_updated_view(table: &MetadataTable, existing: &View) -> Result<View> {
    let info = table_info(table)?;

    let existing_fields: HashMap<&str, &ViewField> = existing
        .fields
        .iter()
        .map(|f| (f.original_name.as_str(), f))
        .collect();

    let mut field_names = NameAllocator::new();
    for field in &existing.fields {
        field_names.seed(&field.display_name, &field.original_name);
    }

    let mut fields = Vec::with_capacity(table.fields.len());
    let mut primary_keys = Vec::new();

    for meta_field in &table.fields {
        let field = match existing_fields.get(meta_field.name.as_str()) {
            Some(old) => make_field(
                info.name.as_str(),
                meta_field,
                old.display_name.clone(),
                old.comment.clone(),
                FieldStatus::Modify,
            ),
            None => {
                let display_name =
                    field_names.resolve(&meta_field.comment, &meta_field.name, &meta_field.name);
                let comment = truncate_chars(&meta_field.comment, MAX_COMMENT_CHARS);
                make_field(info.name.as_str(), meta_field, display_name, comment, FieldStatus::New)
            }
        };
        fields.push(field);
        if meta_field.primary_key {
            primary_keys.push(meta_field.name.clone());
        }
    }

    let query_type = QueryType::for_source(table.source.source_type);
    let qualified = qualified_name(&table.source, &info.name);
    let sql_str = generate_sql(query_type, &qualified, &fields);

    Ok(View {
        view_id: table.table_id.clone(),
        technical_name: info.name.clone(),
        view_name: existing.view_name.clone(),
        group_id: table.source.id.clone(),
        group_name: table.source.name.clone(),
        view_type: ViewType::Atomic,
        query_type,
        status: scan_status(&fields, ViewStatus::Modify),
        delete_time: None,
        sql_str,
        qualified_name: qualified,
        primary_keys,
        comment: existing.comment.clone(),
        source_id: table.source.id.clone(),
        source_type: table.source.source_type,
        builtin: true,
        sheet: table.sheet.clone(),
        fields,
    })
}

/// Whether a rebuilt field list differs structurally from the stored one.
/// Field order is significant; display surfaces and scan status are not.
pub fn fields_changed(existing: &[ViewField], rebuilt: &[ViewField]) -> bool {
    existing.len() != rebuilt.len()
        || existing
            .iter()
            .zip(rebuilt.iter())
            .any(|(a, b)| !a.same_shape(b))
}

fn table_info(table: &MetadataTable) -> Result<&viewsync_core::TableInfo> {
    table.table.as_ref().ok_or_else(|| {
        SyncError::Validation(format!(
            "Metadata record '{}' has no table detail",
            table.table_id
        ))
    })
}

fn make_field(
    table_name: &str,
    meta_field: &MetaField,
    display_name: String,
    comment: String,
    status: FieldStatus,
) -> ViewField {
    if meta_field.data_type.is_none() {
        warn!(
            table = table_name,
            field = %meta_field.name,
            "field type could not be resolved"
        );
    }
    let status = if meta_field.data_type.is_none() {
        FieldStatus::NotSupported
    } else {
        status
    };

    ViewField {
        name: meta_field.name.clone(),
        display_name,
        original_name: meta_field.name.clone(),
        comment,
        data_type: meta_field.data_type.clone(),
        is_nullable: meta_field.is_nullable,
        data_length: meta_field.data_length,
        data_precision: meta_field.data_precision,
        primary_key: meta_field.primary_key,
        status,
    }
}

/// A table with no supported field materializes as `NotSupported`.
fn scan_status(fields: &[ViewField], base: ViewStatus) -> ViewStatus {
    if !fields.is_empty()
        && fields
            .iter()
            .all(|f| f.status == FieldStatus::NotSupported)
    {
        ViewStatus::NotSupported
    } else {
        base
    }
}

/// Fully-qualified table reference: `catalog."schema"."table"`, falling
/// back to the database name when the source has no schema.
pub fn qualified_name(source: &SourceRef, table_name: &str) -> String {
    let schema = if source.schema.is_empty() {
        source.database.as_str()
    } else {
        source.schema.as_str()
    };
    format!("{}.{}.{}", source.catalog, quote(schema), quote(table_name))
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

/// Default query string for SQL query types. Unsupported fields are
/// excluded from the projection; when every field is supported the
/// projection collapses to `*`.
fn generate_sql(query_type: QueryType, qualified: &str, fields: &[ViewField]) -> Option<String> {
    if query_type != QueryType::Sql {
        return None;
    }

    let supported: Vec<&ViewField> = fields
        .iter()
        .filter(|f| f.status != FieldStatus::NotSupported)
        .collect();
    if supported.is_empty() {
        return None;
    }

    if supported.len() == fields.len() {
        Some(format!("SELECT * FROM {}", qualified))
    } else {
        let projection: Vec<String> = supported.iter().map(|f| quote(&f.name)).collect();
        Some(format!("SELECT {} FROM {}", projection.join(","), qualified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use viewsync_core::{DataSourceType, SheetConfig, TableInfo};

    fn source_ref(source_type: DataSourceType) -> SourceRef {
        SourceRef {
            id: "ds-1".to_string(),
            name: "warehouse".to_string(),
            source_type,
            catalog: "hive".to_string(),
            schema: "sales".to_string(),
            database: "salesdb".to_string(),
        }
    }

    fn meta_field(name: &str, data_type: Option<&str>) -> MetaField {
        MetaField {
            name: name.to_string(),
            comment: String::new(),
            data_type: data_type.map(|s| s.to_string()),
            is_nullable: true,
            primary_key: false,
            data_length: None,
            data_precision: None,
        }
    }

    fn meta_table(table_id: &str, name: &str, fields: Vec<MetaField>) -> MetadataTable {
        MetadataTable {
            table_id: table_id.to_string(),
            table: Some(TableInfo {
                id: table_id.to_string(),
                name: name.to_string(),
                description: String::new(),
                update_time: Utc::now(),
            }),
            source: source_ref(DataSourceType::Relational),
            fields,
            sheet: None,
        }
    }

    #[test]
    fn test_view_id_anchored_to_table_id() {
        let table = meta_table("tid-42", "orders", vec![meta_field("id", Some("bigint"))]);
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.view_id, "tid-42");
        assert_eq!(view.technical_name, "orders");
        assert_eq!(view.group_id, "ds-1");
        assert!(view.builtin);
        assert_eq!(view.status, ViewStatus::New);
    }

    #[test]
    fn test_sql_generation_and_qualified_name() {
        let table = meta_table("t1", "orders", vec![meta_field("id", Some("bigint"))]);
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.qualified_name, "hive.\"sales\".\"orders\"");
        assert_eq!(
            view.sql_str.as_deref(),
            Some("SELECT * FROM hive.\"sales\".\"orders\"")
        );
    }

    #[test]
    fn test_schema_falls_back_to_database() {
        let mut table = meta_table("t1", "orders", vec![meta_field("id", Some("bigint"))]);
        table.source.schema = String::new();
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.qualified_name, "hive.\"salesdb\".\"orders\"");
    }

    #[test]
    fn test_document_search_source_gets_dsl() {
        let mut table = meta_table("t1", "logs", vec![meta_field("msg", Some("text"))]);
        table.source.source_type = DataSourceType::DocumentSearch;
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.query_type, QueryType::Dsl);
        assert!(view.sql_str.is_none());
    }

    #[test]
    fn test_unsupported_field_excluded_from_projection() {
        let table = meta_table(
            "t1",
            "orders",
            vec![
                meta_field("id", Some("bigint")),
                meta_field("blob_col", None),
                meta_field("total", Some("decimal")),
            ],
        );
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.fields[1].status, FieldStatus::NotSupported);
        assert_eq!(
            view.sql_str.as_deref(),
            Some("SELECT \"id\",\"total\" FROM hive.\"sales\".\"orders\"")
        );
        assert_eq!(view.status, ViewStatus::New);
    }

    #[test]
    fn test_all_fields_unsupported_marks_view() {
        let table = meta_table(
            "t1",
            "binaries",
            vec![meta_field("a", None), meta_field("b", None)],
        );
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.status, ViewStatus::NotSupported);
        assert!(view.sql_str.is_none());
    }

    #[test]
    fn test_primary_keys_collected() {
        let mut pk = meta_field("id", Some("bigint"));
        pk.primary_key = true;
        let table = meta_table("t1", "orders", vec![pk, meta_field("total", Some("decimal"))]);
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.primary_keys, vec!["id".to_string()]);
        assert!(view.fields[0].primary_key);
    }

    #[test]
    fn test_sheet_config_carried_onto_view() {
        let mut table = meta_table("t1", "budget", vec![meta_field("a", Some("varchar"))]);
        table.source.source_type = DataSourceType::Spreadsheet;
        table.sheet = Some(SheetConfig {
            sheet: "Q1".to_string(),
            start_cell: "A1".to_string(),
            end_cell: "F200".to_string(),
            has_headers: true,
            file_name: "budget.xlsx".to_string(),
        });
        let view = build_view(&table, &mut NameAllocator::new()).unwrap();
        assert_eq!(view.sheet.as_ref().unwrap().sheet, "Q1");
        assert_eq!(view.query_type, QueryType::Sql);
    }

    #[test]
    fn test_dangling_record_is_rejected() {
        let mut table = meta_table("t1", "orders", vec![]);
        table.table = None;
        assert!(build_view(&table, &mut NameAllocator::new()).is_err());
    }

    #[test]
    fn test_update_preserves_user_edited_surfaces() {
        let table = meta_table(
            "t1",
            "orders",
            vec![meta_field("id", Some("bigint")), meta_field("total", Some("decimal"))],
        );
        let mut existing = build_view(&table, &mut NameAllocator::new()).unwrap();
        existing.view_name = "Renamed by a user".to_string();
        existing.comment = "curated".to_string();
        existing.fields[0].display_name = "Identifier".to_string();

        let mut changed = table.clone();
        changed.fields[1].data_type = Some("double".to_string());

        let rebuilt = build_updated_view(&changed, &existing).unwrap();
        assert_eq!(rebuilt.view_name, "Renamed by a user");
        assert_eq!(rebuilt.comment, "curated");
        assert_eq!(rebuilt.fields[0].display_name, "Identifier");
        assert_eq!(rebuilt.fields[0].status, FieldStatus::Modify);
        assert_eq!(rebuilt.status, ViewStatus::Modify);
        assert!(fields_changed(&existing.fields, &rebuilt.fields));
    }

    #[test]
    fn test_update_allocates_names_for_new_fields() {
        let table = meta_table("t1", "orders", vec![meta_field("id", Some("bigint"))]);
        let existing = build_view(&table, &mut NameAllocator::new()).unwrap();

        let mut grown = table.clone();
        let mut extra = meta_field("id2", Some("bigint"));
        extra.comment = "id".to_string();
        grown.fields.push(extra);

        let rebuilt = build_updated_view(&grown, &existing).unwrap();
        assert_eq!(rebuilt.fields[1].status, FieldStatus::New);
        // "id" is taken by the surviving field, so the new one is rewritten
        assert_eq!(rebuilt.fields[1].display_name, "id2_id");
    }

    #[test]
    fn test_unchanged_table_rebuilds_identically() {
        let table = meta_table(
            "t1",
            "orders",
            vec![meta_field("id", Some("bigint")), meta_field("total", Some("decimal"))],
        );
        let existing = build_view(&table, &mut NameAllocator::new()).unwrap();
        let rebuilt = build_updated_view(&table, &existing).unwrap();
        assert!(!fields_changed(&existing.fields, &rebuilt.fields));
    }

    #[test]
    fn test_removed_field_changes_shape() {
        let table = meta_table(
            "t1",
            "orders",
            vec![meta_field("id", Some("bigint")), meta_field("total", Some("decimal"))],
        );
        let existing = build_view(&table, &mut NameAllocator::new()).unwrap();
        let mut shrunk = table.clone();
        shrunk.fields.pop();
        let rebuilt = build_updated_view(&shrunk, &existing).unwrap();
        assert!(fields_changed(&existing.fields, &rebuilt.fields));
    }
}
