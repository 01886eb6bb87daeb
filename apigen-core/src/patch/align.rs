//! Forward-only alignment of current and target declaration sequences
//!
//! Declarations are expected to keep roughly stable relative order between
//! regenerations, so matching is greedy: for each target name the source
//! sequence is searched forward from the last match and never backward.
//! A reordered declaration therefore shows up as one deletion and one
//! insertion rather than as a move.
//!
//! Changes are produced in source order, so the aligner also knows where
//! every target declaration lands once they are applied.

use super::{Change, PatchError};
use crate::model::{DeclEntry, DeclKind, Declaration, DeclarationSet, Module, ModulePosition, Position};
use crate::render::{line_count, Renderer};
use serde_json::Value;
use tracing::info;

/// Fields whose differences never force a declaration to be regenerated
const IGNORED_FIELDS: [&str; 6] = ["doc", "entries", "sourceName", "value", "hints", "position"];

/// Changes turning a header into its target module
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePatch {
    pub changes: Vec<Change>,
    /// The target with the line positions it has in the patched header
    pub located: Module,
}

/// Compute the changes turning `current` into `target`
pub fn check_module_changes(
    current: &Module,
    target: &Module,
    renderer: &dyn Renderer,
) -> Result<Vec<Change>, PatchError> {
    Ok(plan_module_patch(current, target, renderer)?.changes)
}

/// Compute the changes turning `current` into `target`, and locate the
/// target in the patched header
pub fn plan_module_patch(
    current: &Module,
    target: &Module,
    renderer: &dyn Renderer,
) -> Result<ModulePatch, PatchError> {
    let position = current.position.ok_or_else(|| PatchError::MissingPosition {
        name: current.name.clone(),
    })?;

    let (opening, closing) = match (position.doc_begin, position.doc_end) {
        (Some(begin), Some(end)) if current.doc != target.doc => {
            info!(module = %target.name, begin, end, "updating module doc");
            if target.doc.is_empty() {
                // The doc takes its blank separator and the group end with it
                let closing = position.group_end.map(|line| Change::delete(line, line + 1));
                (Some(Change::delete(begin, position.entries_begin.max(end))), closing)
            } else {
                (Some(Change::replace(begin, end, renderer.render_module_doc(target))), None)
            }
        }
        (None, _) | (_, None) if !target.doc.is_empty() => {
            // The group must bracket every declaration: first and last after reverse application
            info!(module = %target.name, "adding module doc group");
            let mut opening = renderer.render_module_doc(target);
            opening.push('\n');
            (
                Some(Change::insert(position.entries_begin, opening)),
                Some(Change::insert(position.entries_end, renderer.render_group_end())),
            )
        }
        _ => (None, None),
    };

    let mut located = target.clone();
    let mut located_position = ModulePosition::default();
    match &opening {
        Some(change) if !target.doc.is_empty() => {
            located_position.doc_begin = Some(change.begin);
            located_position.doc_end = Some(change.begin + line_count(&renderer.render_module_doc(target)));
        }
        Some(_) => {}
        None => {
            located_position.doc_begin = position.doc_begin;
            located_position.doc_end = position.doc_end;
        }
    }

    let mut aligner = Aligner {
        renderer,
        changes: Vec::new(),
        offset: opening.as_ref().map_or(0, line_delta),
    };
    located_position.entries_begin = aligner.shifted(position.entries_begin);
    aligner.check_changes(
        &current.entries,
        &mut located.entries,
        position.entries_begin,
        position.entries_end,
        0,
    )?;
    located_position.entries_end = aligner.shifted(position.entries_end);
    located_position.group_end = match &closing {
        Some(change) if change.replacement.is_some() => Some(located_position.entries_end),
        Some(_) => None,
        None => position.group_end.map(|line| aligner.shifted(line)),
    };
    located.position = Some(located_position);

    let changes = opening.into_iter().chain(aligner.changes).chain(closing).collect();
    Ok(ModulePatch { changes, located })
}

/// Lines added by a change, negative when it removes lines
fn line_delta(change: &Change) -> isize {
    let added = change.replacement.as_deref().map_or(0, |text| text.lines().count());
    added as isize - (change.end - change.begin) as isize
}

fn position_of(decl: &Declaration) -> Result<Position, PatchError> {
    decl.position.ok_or_else(|| PatchError::MissingPosition {
        name: decl.name.clone(),
    })
}

/// `[begin, end)` covered by every declaration of an entry
fn entry_range(key: &str, entry: &DeclEntry) -> Result<(usize, usize), PatchError> {
    match (entry.first(), entry.as_slice().last()) {
        (Some(first), Some(last)) => Ok((position_of(first)?.begin, position_of(last)?.end)),
        _ => Err(PatchError::MissingPosition { name: key.to_string() }),
    }
}

/// Declaration as a value, without the fields that do not affect its shape
fn shape(decl: &Declaration) -> Result<Value, PatchError> {
    let mut value = serde_json::to_value(decl)?;
    if let Value::Object(object) = &mut value {
        for field in IGNORED_FIELDS {
            object.remove(field);
        }
    }
    Ok(value)
}

struct Aligner<'r> {
    renderer: &'r dyn Renderer,
    changes: Vec<Change>,
    /// Lines added so far by changes before the current source line
    offset: isize,
}

impl Aligner<'_> {
    fn render(&self, entry: &DeclEntry, depth: usize) -> String {
        entry.iter().map(|decl| self.renderer.render_entry(decl, depth)).collect()
    }

    fn push(&mut self, change: Change) {
        self.offset += line_delta(&change);
        self.changes.push(change);
    }

    /// Where a source line ends up given the changes pushed so far
    fn shifted(&self, line: usize) -> usize {
        line.saturating_add_signed(self.offset)
    }

    /// Position freshly rendered declarations starting at `line`
    fn locate(&self, decls: &mut [Declaration], depth: usize, mut line: usize) {
        for decl in decls {
            line = self.renderer.locate_entry(decl, depth, line);
        }
    }

    /// Align one declaration set inside the line range `[begin, end)`
    fn check_changes(
        &mut self,
        source: &DeclarationSet,
        target: &mut DeclarationSet,
        begin: usize,
        end: usize,
        depth: usize,
    ) -> Result<(), PatchError> {
        let source_entries: Vec<(&String, &DeclEntry)> = source.iter().collect();
        for (key, entry) in &source_entries {
            let (entry_begin, entry_end) = entry_range(key, entry)?;
            if entry_begin < begin || entry_end > end {
                return Err(PatchError::PrematureEnd {
                    name: key.to_string(),
                    line: entry_end,
                    end,
                });
            }
        }

        let mut source_index = 0;
        let mut cursor = begin;
        for (key, target_entry) in target.iter_mut() {
            let found = source_entries[source_index..]
                .iter()
                .position(|(source_key, _)| *source_key == key)
                .map(|offset| source_index + offset);

            let Some(index) = found else {
                info!(name = %key, line = cursor, "inserting declaration");
                let text = self.render(target_entry, depth);
                self.locate(target_entry.as_mut_slice(), depth, self.shifted(cursor));
                self.push(Change::insert(cursor, text));
                continue;
            };

            if index > source_index {
                self.delete_span(&source_entries[source_index..index])?;
            }
            let (_, source_entry) = source_entries[index];
            self.check_entry_changes(key, source_entry, target_entry, depth)?;
            cursor = entry_range(key, source_entry)?.1;
            source_index = index + 1;
        }

        if source_index < source_entries.len() {
            self.delete_span(&source_entries[source_index..])?;
        }
        Ok(())
    }

    /// Delete consecutive source entries as a single range
    fn delete_span(&mut self, entries: &[(&String, &DeclEntry)]) -> Result<(), PatchError> {
        let (Some((first_key, first)), Some((last_key, last))) = (entries.first(), entries.last()) else {
            return Ok(());
        };
        let begin = entry_range(first_key, first)?.0;
        let end = entry_range(last_key, last)?.1;
        let names: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
        info!(names = ?names, begin, end, "deleting declarations");
        self.push(Change::delete(begin, end));
        Ok(())
    }

    /// Compare overload groups element-wise
    fn check_entry_changes(
        &mut self,
        key: &str,
        source: &DeclEntry,
        target: &mut DeclEntry,
        depth: usize,
    ) -> Result<(), PatchError> {
        let source = source.as_slice();
        let target = target.as_mut_slice();
        let common = source.len().min(target.len());

        for (current, wanted) in source.iter().zip(target.iter_mut()) {
            self.check_declaration(current, wanted, depth)?;
        }

        if target.len() > source.len() {
            let Some(last) = source.last() else {
                return Err(PatchError::MissingPosition { name: key.to_string() });
            };
            let at = position_of(last)?.end;
            info!(name = key, count = target.len() - common, line = at, "appending overloads");
            let text: String = target[common..]
                .iter()
                .map(|decl| self.renderer.render_entry(decl, depth))
                .collect();
            self.locate(&mut target[common..], depth, self.shifted(at));
            self.push(Change::insert(at, text));
        } else if source.len() > target.len() {
            let begin = position_of(&source[common])?.begin;
            let end = position_of(&source[source.len() - 1])?.end;
            info!(name = key, count = source.len() - common, begin, end, "removing overloads");
            self.push(Change::delete(begin, end));
        }
        Ok(())
    }

    fn check_declaration(
        &mut self,
        source: &Declaration,
        target: &mut Declaration,
        depth: usize,
    ) -> Result<(), PatchError> {
        let position = position_of(source)?;

        let unaligned = match (source.kind.entries(), target.kind.entries()) {
            (Some(current), Some(wanted)) => {
                (position.entries_begin.is_none() || position.entries_end.is_none())
                    && !(current.is_empty() && wanted.is_empty())
            }
            _ => false,
        };
        let doc_inline = matches!(target.kind, DeclKind::Variable) && source.doc != target.doc;

        if unaligned || doc_inline || shape(source)? != shape(target)? {
            info!(name = %target.name, begin = position.begin, end = position.end, "regenerating declaration");
            let text = self.renderer.render_entry(target, depth);
            self.renderer.locate_entry(target, depth, self.shifted(position.begin));
            self.push(Change::replace(position.begin, position.end, text));
            return Ok(());
        }

        let begin = self.shifted(position.begin);
        if source.doc != target.doc {
            info!(name = %target.name, begin = position.begin, end = position.decl, "updating doc");
            if target.doc.is_empty() {
                if position.begin < position.decl {
                    self.push(Change::delete(position.begin, position.decl));
                }
            } else {
                let doc = self.renderer.render_doc(&target.doc, depth);
                self.push(Change::replace(position.begin, position.decl, doc));
            }
        }
        let mut located = Position::new(begin, self.shifted(position.decl), position.end);

        if let (Some(current), Some(wanted), Some(entries_begin), Some(entries_end)) = (
            source.kind.entries(),
            target.kind.entries_mut(),
            position.entries_begin,
            position.entries_end,
        ) {
            let nested_begin = self.shifted(entries_begin);
            self.check_changes(current, wanted, entries_begin, entries_end, depth + 1)?;
            located = located.with_entries(nested_begin, self.shifted(entries_end));
        }
        located.end = self.shifted(position.end);
        target.position = Some(located);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModulePosition;
    use crate::render::HeaderRenderer;

    fn at(decl: Declaration, begin: usize, decl_line: usize, end: usize) -> Declaration {
        decl.with_position(Position::new(begin, decl_line, end))
    }

    fn module(entries: Vec<Declaration>, entries_begin: usize, entries_end: usize) -> Module {
        let mut module = Module::new("test");
        for decl in entries {
            module = module.with_entry(decl);
        }
        module.position = Some(ModulePosition {
            entries_begin,
            entries_end,
            ..Default::default()
        });
        module
    }

    fn target(entries: Vec<Declaration>) -> Module {
        let mut module = Module::new("test");
        for decl in entries {
            module = module.with_entry(decl);
        }
        module
    }

    fn abc() -> Module {
        module(
            vec![
                at(Declaration::function("A", "void").with_doc("A."), 1, 2, 3),
                at(Declaration::function("B", "int").with_doc("B."), 3, 4, 5),
                at(Declaration::function("C", "void").with_doc("C."), 5, 6, 7),
            ],
            1,
            7,
        )
    }

    #[test]
    fn test_unchanged_module_has_no_changes() {
        let current = abc();
        let wanted = target(vec![
            Declaration::function("A", "void").with_doc("A."),
            Declaration::function("B", "int").with_doc("B."),
            Declaration::function("C", "void").with_doc("C."),
        ]);
        let changes = check_module_changes(&current, &wanted, &HeaderRenderer::default()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_single_changed_declaration() {
        let renderer = HeaderRenderer::default();
        let changed = Declaration::function("B", "bool").with_doc("B.");
        let wanted = target(vec![
            Declaration::function("A", "void").with_doc("A."),
            changed.clone(),
            Declaration::function("C", "void").with_doc("C."),
        ]);
        let changes = check_module_changes(&abc(), &wanted, &renderer).unwrap();
        assert_eq!(changes, vec![Change::replace(3, 5, renderer.render_entry(&changed, 0))]);
    }

    #[test]
    fn test_doc_only_change_touches_doc_range() {
        let renderer = HeaderRenderer::default();
        let wanted = target(vec![
            Declaration::function("A", "void").with_doc("A."),
            Declaration::function("B", "int").with_doc("Better B."),
            Declaration::function("C", "void").with_doc("C."),
        ]);
        let changes = check_module_changes(&abc(), &wanted, &renderer).unwrap();
        assert_eq!(changes, vec![Change::replace(3, 4, renderer.render_doc("Better B.", 0))]);
    }

    #[test]
    fn test_insert_and_coalesced_delete() {
        let renderer = HeaderRenderer::default();
        let current = module(
            vec![
                at(Declaration::function("A", "void"), 1, 1, 2),
                at(Declaration::function("X", "void"), 2, 2, 3),
                at(Declaration::function("Y", "void"), 3, 3, 4),
                at(Declaration::function("C", "void"), 4, 4, 5),
            ],
            1,
            5,
        );
        let inserted = Declaration::function("B", "void");
        let wanted = target(vec![Declaration::function("A", "void"), inserted.clone(), Declaration::function("C", "void")]);
        let changes = check_module_changes(&current, &wanted, &renderer).unwrap();
        assert_eq!(
            changes,
            vec![
                Change::insert(2, renderer.render_entry(&inserted, 0)),
                Change::delete(2, 4),
            ]
        );
    }

    #[test]
    fn test_trailing_deletion() {
        let current = abc();
        let wanted = target(vec![Declaration::function("A", "void").with_doc("A.")]);
        let changes = check_module_changes(&current, &wanted, &HeaderRenderer::default()).unwrap();
        assert_eq!(changes, vec![Change::delete(3, 7)]);
    }

    #[test]
    fn test_overload_append_is_one_change() {
        let renderer = HeaderRenderer::default();
        let current = module(
            vec![
                at(Declaration::function("f", "void").with_param("x", "int"), 1, 1, 2),
                at(Declaration::function("f", "void").with_param("x", "float"), 2, 2, 3),
            ],
            1,
            3,
        );
        let extra = Declaration::function("f", "void").with_param("x", "double");
        let wanted = target(vec![
            Declaration::function("f", "void").with_param("x", "int"),
            Declaration::function("f", "void").with_param("x", "float"),
            extra.clone(),
        ]);
        let changes = check_module_changes(&current, &wanted, &renderer).unwrap();
        assert_eq!(changes, vec![Change::insert(3, renderer.render_entry(&extra, 0))]);
    }

    #[test]
    fn test_overload_removal() {
        let current = module(
            vec![
                at(Declaration::function("f", "void").with_param("x", "int"), 1, 1, 2),
                at(Declaration::function("f", "void").with_param("x", "float"), 2, 2, 3),
                at(Declaration::function("f", "void").with_param("x", "double"), 3, 3, 4),
            ],
            1,
            4,
        );
        let wanted = target(vec![Declaration::function("f", "void").with_param("x", "int")]);
        let changes = check_module_changes(&current, &wanted, &HeaderRenderer::default()).unwrap();
        assert_eq!(changes, vec![Change::delete(2, 4)]);
    }

    #[test]
    fn test_nested_members_are_aligned() {
        let renderer = HeaderRenderer::default();
        let member = at(Declaration::function("Get", "int"), 3, 3, 4);
        let owner = Declaration::new(DeclKind::new_struct(), "Foo")
            .with_entry(member)
            .with_position(Position::new(1, 1, 6).with_entries(3, 4));
        let current = module(vec![owner], 1, 6);

        let added = Declaration::function("Set", "void");
        let wanted = target(vec![Declaration::new(DeclKind::new_struct(), "Foo")
            .with_entry(Declaration::function("Get", "int"))
            .with_entry(added.clone())]);
        let changes = check_module_changes(&current, &wanted, &renderer).unwrap();
        assert_eq!(changes, vec![Change::insert(4, renderer.render_entry(&added, 1))]);
    }

    #[test]
    fn test_module_doc_brackets_declarations() {
        let renderer = HeaderRenderer::default();
        let current = abc();
        let mut wanted = target(vec![
            Declaration::function("A", "void").with_doc("A."),
            Declaration::function("B", "int").with_doc("B."),
            Declaration::function("C", "void").with_doc("C."),
        ]);
        wanted.doc = "Test module.".into();
        let changes = check_module_changes(&current, &wanted, &renderer).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].begin, 1);
        assert!(changes[0].replacement.as_deref().unwrap().contains("@defgroup"));
        assert_eq!(changes[1], Change::insert(7, renderer.render_group_end()));
    }

    fn grouped(doc: &str, entries: Vec<Declaration>) -> Module {
        let mut module = Module {
            name: "test".into(),
            doc: doc.into(),
            ..Default::default()
        };
        for decl in entries {
            module = module.with_entry(decl);
        }
        module
    }

    /// Apply `changes` to `text` the way a patched file ends up
    fn patched(text: &str, changes: &[Change]) -> Vec<String> {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        crate::patch::apply_changes(&mut lines, changes).unwrap();
        lines
    }

    fn fresh(renderer: &HeaderRenderer, module: &Module) -> Vec<String> {
        renderer.render_module(module).lines().map(str::to_string).collect()
    }

    #[test]
    fn test_module_doc_removal_takes_group_markers() {
        let renderer = HeaderRenderer::default();
        let entries = || vec![Declaration::function("A", "void"), Declaration::function("B", "void")];
        let (text, current) = renderer.render_positioned(&grouped("Test.", entries()));
        let wanted = grouped("", entries());

        let plan = plan_module_patch(&current, &wanted, &renderer).unwrap();
        assert_eq!(plan.changes, vec![Change::delete(1, 7), Change::delete(11, 12)]);
        assert_eq!(patched(&text, &plan.changes), fresh(&renderer, &wanted));
        assert_eq!(plan.located, renderer.render_positioned(&wanted).1);
    }

    #[test]
    fn test_module_doc_replacement_keeps_group() {
        let renderer = HeaderRenderer::default();
        let entries = || vec![Declaration::function("A", "void")];
        let (text, current) = renderer.render_positioned(&grouped("Test.", entries()));
        let wanted = grouped("Better test.\n\nWith details.", entries());

        let plan = plan_module_patch(&current, &wanted, &renderer).unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!((plan.changes[0].begin, plan.changes[0].end), (1, 6));
        assert_eq!(patched(&text, &plan.changes), fresh(&renderer, &wanted));
        assert_eq!(plan.located, renderer.render_positioned(&wanted).1);
    }

    #[test]
    fn test_located_target_matches_fresh_render() {
        let renderer = HeaderRenderer::default();
        let point = |members: &[&str]| {
            members.iter().fold(Declaration::new(DeclKind::new_struct(), "Point"), |decl, name| {
                decl.with_entry(Declaration::new(DeclKind::Variable, name).with_type("int"))
            })
        };
        let before = grouped(
            "",
            vec![
                Declaration::function("Init", "void").with_doc("Start."),
                Declaration::function("Delay", "void").with_param("ms", "int").with_doc("Wait."),
                point(&["x"]),
                Declaration::function("f", "void").with_param("x", "int"),
                Declaration::function("Quit", "void"),
            ],
        );
        let after = grouped(
            "Timer.",
            vec![
                Declaration::function("Init", "void").with_doc("Start up."),
                Declaration::function("Delay", "void").with_param("ms", "Uint32").with_doc("Wait."),
                Declaration::function("Pause", "void"),
                point(&["x", "y"]),
                Declaration::function("f", "void").with_param("x", "int"),
                Declaration::function("f", "void").with_param("x", "float"),
            ],
        );

        let (text, current) = renderer.render_positioned(&before);
        let plan = plan_module_patch(&current, &after, &renderer).unwrap();
        assert_eq!(patched(&text, &plan.changes), fresh(&renderer, &after));
        assert_eq!(plan.located, renderer.render_positioned(&after).1);

        let again = plan_module_patch(&plan.located, &after, &renderer).unwrap();
        assert!(again.changes.is_empty());
        assert_eq!(again.located, plan.located);
    }

    #[test]
    fn test_missing_position_is_an_error() {
        let current = module(vec![Declaration::function("A", "void")], 1, 2);
        let wanted = target(vec![Declaration::function("A", "void")]);
        let err = check_module_changes(&current, &wanted, &HeaderRenderer::default()).unwrap_err();
        assert!(matches!(err, PatchError::MissingPosition { name } if name == "A"));
    }

    #[test]
    fn test_declaration_past_enclosing_range() {
        let current = module(vec![at(Declaration::function("A", "void"), 1, 1, 9)], 1, 5);
        let wanted = target(vec![Declaration::function("A", "void")]);
        let err = check_module_changes(&current, &wanted, &HeaderRenderer::default()).unwrap_err();
        assert!(matches!(err, PatchError::PrematureEnd { line: 9, end: 5, .. }));
    }
}
