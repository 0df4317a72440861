//! Builtin view-group reconciliation.
//!
//! Builtin groups map 1:1 onto data sources (`group_id == source.id`).
//! Each cycle aligns the group list with the live source list before any
//! per-source view work runs, so new sources have a group to materialize
//! into and removed sources have their views soft-deleted before a stale
//! write can target them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use viewsync_core::naming::{truncate_chars, MAX_DISPLAY_NAME_CHARS};
use viewsync_core::{DataSource, DataSourceType, Result, ViewGroup};

use crate::traits::GroupStore;

/// Well-known group holding index-base views, maintained by the separate
/// index scanning path and excluded from reconciliation here.
pub const INDEX_BASE_GROUP_ID: &str = "index_base";

pub struct GroupReconciler {
    groups: Arc<dyn GroupStore>,
}

impl GroupReconciler {
    pub fn new(groups: Arc<dyn GroupStore>) -> Self {
        Self { groups }
    }

    /// Align builtin groups with the live source list.
    ///
    /// Deletions run before creations and renames: when a source is
    /// deleted and a same-named one recreated in the same window, the
    /// stale group must go before the new one appears.
    pub async fn reconcile(
        &self,
        sources: &[DataSource],
        builtin_groups: &[ViewGroup],
    ) -> Result<()> {
        let index_base_ids: Vec<&str> = sources
            .iter()
            .filter(|s| s.source_type == DataSourceType::IndexBase)
            .map(|s| s.id.as_str())
            .collect();

        let source_map: HashMap<&str, &DataSource> = sources
            .iter()
            .filter(|s| s.source_type != DataSourceType::IndexBase)
            .map(|s| (s.id.as_str(), s))
            .collect();

        let group_map: HashMap<&str, &ViewGroup> = builtin_groups
            .iter()
            .filter(|g| {
                g.group_id != INDEX_BASE_GROUP_ID
                    && !index_base_ids.contains(&g.group_id.as_str())
            })
            .map(|g| (g.group_id.as_str(), g))
            .collect();

        for group in group_map.values() {
            if !source_map.contains_key(group.group_id.as_str()) {
                self.groups.mark_deleted(&group.group_id, true).await?;
                info!(
                    group = %group.group_name,
                    "marked view group and its views deleted, source no longer exists"
                );
            }
        }

        for source in source_map.values() {
            let group_name = truncate_chars(&source.name, MAX_DISPLAY_NAME_CHARS);
            match group_map.get(source.id.as_str()) {
                None => {
                    self.groups
                        .create(&ViewGroup {
                            group_id: source.id.clone(),
                            group_name: group_name.clone(),
                            builtin: true,
                        })
                        .await?;
                    info!(source = %source.name, "created builtin view group");
                }
                Some(group) if group.group_name != group_name => {
                    self.groups.rename(&source.id, &group_name).await?;
                    info!(
                        from = %group.group_name,
                        to = %group_name,
                        "renamed builtin view group"
                    );
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}
