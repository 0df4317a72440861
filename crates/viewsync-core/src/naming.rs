//! Display-name sanitization for ViewSync
//!
//! Scanned table and column comments arrive in arbitrary shape; before
//! they become display names they are cleaned against a whitelist and
//! truncated to the catalog's length limits. Kept here so every layer
//! (engine, store, callers) truncates identically.

use lazy_static::lazy_static;
use regex::Regex;

/// Maximum length of view and field display names, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 128;

/// Maximum length of view and field comments, in characters
pub const MAX_COMMENT_CHARS: usize = 512;

lazy_static! {
    // Whitelist: letters in any script, digits, underscore, hyphen, dot.
    // Everything else, including whitespace, is removed.
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^\p{L}\p{N}_\-\.]").unwrap();
}

/// Strip every character outside the display-name whitelist.
///
/// Letters of non-Latin scripts are kept; whitespace is removed entirely
/// rather than replaced.
pub fn clean_display_name(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    UNSAFE_CHARS.replace_all(input, "").into_owned()
}

/// Truncate a string to `max` characters (not bytes), preserving
/// multi-byte sequences.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
