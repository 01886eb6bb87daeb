//! Incremental patching of generated headers
//!
//! Reconciles a header as it currently is (parsed with line positions)
//! against the target module, producing line-range [`Change`]s. Only the
//! spans the generator actually changed are rewritten, so hand edits
//! elsewhere survive regeneration.
//!
//! Changes are listed in source order and applied last-first.

mod align;
mod apply;

pub use align::{check_module_changes, plan_module_patch, ModulePatch};
pub use apply::{apply_changes, patch_file, PatchSummary};

use thiserror::Error;

/// One edit of the current buffer
///
/// Lines are 1-based, `end` is exclusive. `begin == end` inserts before
/// line `begin`; no replacement deletes the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub begin: usize,
    pub end: usize,
    pub replacement: Option<String>,
}

impl Change {
    pub fn insert(line: usize, text: String) -> Self {
        Self {
            begin: line,
            end: line,
            replacement: Some(text),
        }
    }

    pub fn replace(begin: usize, end: usize, text: String) -> Self {
        Self {
            begin,
            end,
            replacement: Some(text),
        }
    }

    pub fn delete(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            replacement: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{name} has no source position")]
    MissingPosition { name: String },
    #[error("{name} ends at line {line}, past the end of its enclosing range at line {end}")]
    PrematureEnd { name: String, line: usize, end: usize },
    #[error("Change {begin}..{end} is outside a buffer of {len} lines")]
    InvalidRange { begin: usize, end: usize, len: usize },
    #[error("Change at line {begin} overlaps the previous change ending at line {previous_end}")]
    Overlapping { begin: usize, previous_end: usize },
    #[error("Failed to encode declaration: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
