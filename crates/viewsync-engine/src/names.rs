//! Collision-aware display-name allocation.
//!
//! Display names are derived from human-readable hints (table
//! descriptions, field comments) with the technical name as fallback.
//! Allocation is scoped: one allocator per data source for view names,
//! one per table for field names, so collisions are resolved within the
//! smallest meaningful namespace and resolution stays deterministic in
//! processing order.

use std::collections::HashMap;

use viewsync_core::naming::{clean_display_name, truncate_chars, MAX_DISPLAY_NAME_CHARS};

/// Tracks the display names already taken in one scope, keyed back to
/// the identity that owns each name.
#[derive(Debug)]
pub struct NameAllocator {
    used: HashMap<String, String>,
    limit: usize,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::with_limit(MAX_DISPLAY_NAME_CHARS)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            used: HashMap::new(),
            limit,
        }
    }

    /// Register a name that is already live in this scope (e.g. existing
    /// views of the source) so new allocations dedup against it.
    pub fn seed(&mut self, name: &str, owner: &str) {
        self.used.insert(name.to_string(), owner.to_string());
    }

    /// Resolve the display name for `owner`.
    ///
    /// The hint is sanitized and truncated; an empty result falls back to
    /// the technical name. If the candidate is already taken by a
    /// different owner it is rewritten as `<technical_name>_<candidate>`
    /// (truncated again). The final name is recorded in the scope, so the
    /// same owner resolves to the same name on every cycle.
    pub fn resolve(&mut self, hint: &str, technical_name: &str, owner: &str) -> String {
        let cleaned = clean_display_name(hint);
        let mut candidate = truncate_chars(&cleaned, self.limit);
        if candidate.is_empty() {
            candidate = truncate_chars(technical_name, self.limit);
        }

        if let Some(existing_owner) = self.used.get(&candidate) {
            if existing_owner != owner {
                candidate = truncate_chars(
                    &format!("{}_{}", technical_name, candidate),
                    self.limit,
                );
            }
        }

        self.used.insert(candidate.clone(), owner.to_string());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_rewrites_with_technical_name() {
        let mut names = NameAllocator::new();
        assert_eq!(names.resolve("X", "tbl_a", "id-a"), "X");
        assert_eq!(names.resolve("X", "tbl_b", "id-b"), "tbl_b_X");
    }

    #[test]
    fn test_same_owner_is_stable_across_cycles() {
        let mut names = NameAllocator::new();
        assert_eq!(names.resolve("orders", "t_orders", "id-1"), "orders");
        // Re-resolving for the same identity must not rewrite
        assert_eq!(names.resolve("orders", "t_orders", "id-1"), "orders");
    }

    #[test]
    fn test_empty_hint_falls_back_to_technical_name() {
        let mut names = NameAllocator::new();
        assert_eq!(names.resolve("", "raw_events", "id-1"), "raw_events");
        // A hint that sanitizes to nothing behaves the same
        assert_eq!(names.resolve("!!! ???", "raw_logs", "id-2"), "raw_logs");
    }

    #[test]
    fn test_seeded_names_collide() {
        let mut names = NameAllocator::new();
        names.seed("orders", "existing-view");
        assert_eq!(names.resolve("orders", "t_orders", "id-new"), "t_orders_orders");
    }

    #[test]
    fn test_hint_is_sanitized_before_dedup() {
        let mut names = NameAllocator::new();
        assert_eq!(names.resolve("daily report", "t1", "id-1"), "dailyreport");
        assert_eq!(names.resolve("daily  report", "t2", "id-2"), "t2_dailyreport");
    }

    #[test]
    fn test_rewrite_respects_length_limit() {
        let mut names = NameAllocator::with_limit(8);
        assert_eq!(names.resolve("metrics", "tbl_one", "id-1"), "metrics");
        let second = names.resolve("metrics", "tbl_two", "id-2");
        assert_eq!(second, "tbl_two_");
        assert!(second.chars().count() <= 8);
    }
}
