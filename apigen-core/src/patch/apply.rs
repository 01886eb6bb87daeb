//! Applying changes to a line buffer and to files on disk

use super::{plan_module_patch, Change, ModulePatch, PatchError};
use crate::model::Module;
use crate::render::Renderer;
use std::fs;
use std::path::Path;
use tracing::info;

/// Outcome of patching one file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchSummary {
    pub changes: Vec<Change>,
    /// False for no-op runs and dry runs
    pub written: bool,
    /// The target positioned in the patched file
    pub located: Module,
}

/// Apply changes listed in source order, last change first.
///
/// Ranges are validated up front so a bad change leaves `lines` untouched.
pub fn apply_changes(lines: &mut Vec<String>, changes: &[Change]) -> Result<(), PatchError> {
    let len = lines.len();
    let mut previous_end = 1;
    for change in changes {
        if change.begin == 0 || change.begin > change.end || change.end > len + 1 {
            return Err(PatchError::InvalidRange {
                begin: change.begin,
                end: change.end,
                len,
            });
        }
        if change.begin < previous_end {
            return Err(PatchError::Overlapping {
                begin: change.begin,
                previous_end,
            });
        }
        previous_end = change.end;
    }

    for change in changes.iter().rev() {
        let replacement: Vec<String> = change
            .replacement
            .as_deref()
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default();
        lines.splice(change.begin - 1..change.end - 1, replacement);
    }
    Ok(())
}

/// Patch `path` so it matches `target`. The file is written only when at
/// least one change was found and `dry_run` is false.
pub fn patch_file(
    path: &Path,
    current: &Module,
    target: &Module,
    renderer: &dyn Renderer,
    dry_run: bool,
) -> Result<PatchSummary, PatchError> {
    let ModulePatch { changes, located } = plan_module_patch(current, target, renderer)?;
    if changes.is_empty() {
        return Ok(PatchSummary {
            changes,
            written: false,
            located,
        });
    }

    let file_name = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: file_name.clone(),
        source,
    })?;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    apply_changes(&mut lines, &changes)?;

    if dry_run {
        info!(file = %file_name, changes = changes.len(), "dry run, not writing");
        return Ok(PatchSummary {
            changes,
            written: false,
            located,
        });
    }

    let mut output = lines.join("\n");
    if content.is_empty() || content.ends_with('\n') {
        output.push('\n');
    }
    fs::write(path, output).map_err(|source| PatchError::Io {
        path: file_name.clone(),
        source,
    })?;
    info!(file = %file_name, changes = changes.len(), "patched");
    Ok(PatchSummary {
        changes,
        written: true,
        located,
    })
}
