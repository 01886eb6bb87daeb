//! Expansion passes
//!
//! Each pass rewrites a module's *source* declaration set in place and
//! registers synthetic declarations, deltas and type/name mappings in the
//! [`TransformContext`]. None of them produce output; emission consults
//! what they registered.
//!
//! Order: resources → wrappers → enumerations → namespaces → callbacks.

pub mod callbacks;
pub mod enumerations;
pub mod namespaces;
pub mod resources;
pub mod wrappers;

use crate::config::FileSpec;
use crate::context::TransformContext;
use crate::model::{DeclEntry, DeclKind, DeclarationSet};

/// Run every expansion pass over one module's source declarations
pub fn expand_module(entries: &mut DeclarationSet, file: &FileSpec, ctx: &mut TransformContext) {
    resources::expand_resources(entries, file, ctx);
    wrappers::expand_wrappers(entries, file, ctx);
    enumerations::expand_enumerations(entries, file, ctx);
    namespaces::expand_namespaces(entries, file, ctx);
    callbacks::expand_callbacks(entries, ctx);
}

/// Map every declared source type to its candidate target name.
///
/// Runs after the passes of all modules so that mappings registered by a
/// pass take precedence.
pub fn register_declared_types(entries: &DeclarationSet, ctx: &mut TransformContext) {
    for (key, entry) in entries {
        if ctx.is_synthetic(key) || ctx.is_blacklisted(key) {
            continue;
        }
        let Some(decl) = entry.first() else {
            continue;
        };
        let is_type = matches!(
            decl.kind,
            DeclKind::Alias
                | DeclKind::Callback
                | DeclKind::Struct { .. }
                | DeclKind::Union { .. }
                | DeclKind::Enum { .. }
                | DeclKind::ForwardDeclaration
        );
        if is_type {
            let target = ctx.make_name(key);
            if target != *key {
                ctx.map_type_if_absent(key, &target);
            }
        }
    }
}

/// Insert `entry` under `key` right after `anchor`, or at the end
pub(crate) fn insert_after(set: &mut DeclarationSet, anchor: &str, key: String, entry: DeclEntry) {
    let index = set.get_index_of(anchor).map_or(set.len(), |i| i + 1);
    insert_at(set, index, key, entry);
}

pub(crate) fn insert_at(set: &mut DeclarationSet, index: usize, key: String, entry: DeclEntry) {
    let index = index.min(set.len());
    set.shift_insert(index, key, entry);
}

/// Replace the entry at `index` with a new key and entry, keeping its position
pub(crate) fn replace_at(set: &mut DeclarationSet, index: usize, key: String, entry: DeclEntry) {
    set.shift_remove_index(index);
    insert_at(set, index, key, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformSpec;
    use crate::model::Declaration;

    #[test]
    fn test_insert_after_keeps_order() {
        let mut set = DeclarationSet::new();
        set.insert("a".into(), Declaration::function("a", "void").into());
        set.insert("c".into(), Declaration::function("c", "void").into());
        insert_after(&mut set, "a", "b".into(), Declaration::function("b", "void").into());
        insert_after(&mut set, "missing", "d".into(), Declaration::function("d", "void").into());
        let keys: Vec<&String> = set.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_replace_at() {
        let mut set = DeclarationSet::new();
        set.insert("a".into(), Declaration::function("a", "void").into());
        set.insert("b".into(), Declaration::function("b", "void").into());
        replace_at(&mut set, 0, "z".into(), Declaration::function("z", "void").into());
        let keys: Vec<&String> = set.keys().collect();
        assert_eq!(keys, vec!["z", "b"]);
    }

    #[test]
    fn test_register_declared_types() {
        let spec = TransformSpec {
            prefixes: vec!["SDL_".into()],
            ..Default::default()
        };
        let mut ctx = TransformContext::new(&spec).unwrap();
        let mut set = DeclarationSet::new();
        set.insert(
            "SDL_Rect".into(),
            Declaration::new(DeclKind::new_struct(), "SDL_Rect").into(),
        );
        set.insert("SDL_Quit".into(), Declaration::function("SDL_Quit", "void").into());
        register_declared_types(&set, &mut ctx);
        assert_eq!(ctx.param_type("const SDL_Rect *"), "const Rect *");
        assert_eq!(ctx.param_type("SDL_Quit"), "SDL_Quit");
    }
}
