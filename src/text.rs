//! User-facing message lookup.
//!
//! Sessions build error messages from message ids so a host can localize
//! them. The library works with [`IdentityText`] (ids verbatim) when no
//! table is installed.

use indexmap::IndexMap;

/// Message ids used by sessions and plugins
pub mod ids {
    pub const ERROR_OPEN: &str = "error_file_open";
    pub const ERROR_READ: &str = "error_read";
    pub const ERROR_WRITE: &str = "error_write";
    pub const ERROR_UNSUPPORTED: &str = "error_unsupported_format";
    pub const ERROR_SEQUENCE: &str = "error_sequence";
}

/// Resolves a message id to display text
pub trait TextResolver: Send + Sync {
    fn text(&self, id: &str) -> String;
}

/// Returns ids unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityText;

impl TextResolver for IdentityText {
    fn text(&self, id: &str) -> String {
        id.to_string()
    }
}

/// Message table with English defaults. Unknown ids resolve to themselves.
#[derive(Debug, Clone)]
pub struct TextTable {
    entries: IndexMap<String, String>,
}

impl TextTable {
    pub fn empty() -> Self {
        Self { entries: IndexMap::new() }
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(id.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TextTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(ids::ERROR_OPEN, "Cannot open file");
        table.insert(ids::ERROR_READ, "Cannot read frame");
        table.insert(ids::ERROR_WRITE, "Cannot write frame");
        table.insert(ids::ERROR_UNSUPPORTED, "Unsupported file format");
        table.insert(ids::ERROR_SEQUENCE, "Malformed frame sequence");
        table
    }
}

impl TextResolver for TextTable {
    fn text(&self, id: &str) -> String {
        self.entries.get(id).cloned().unwrap_or_else(|| id.to_string())
    }
}
