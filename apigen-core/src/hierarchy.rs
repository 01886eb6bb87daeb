//! Hierarchy resolution
//!
//! A target name such as `Window.SetTitle` moves the declaration into the
//! `Window` container; `Window::Window` copies it there and leaves a free
//! function stub delegating to the member. Owners are found through
//! [`TransformContext::types`] by the first path segment, then through
//! nested sets. Unresolvable paths leave the declaration where it is.

use crate::context::{is_const_qualified, TransformContext, TypeLocation};
use crate::model::{DeclEntry, DeclKind, Declaration, Hints, Module, Parameter};
use indexmap::IndexMap;
use tracing::debug;

const OWNER_SUFFIXES: [&str; 4] = ["Base", "Ref", "Param", "Lock"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    /// `Owner.member`: relocate
    Move,
    /// `Owner::member`: relocate a copy, keep a free stub
    Duplicate,
}

/// Split a hierarchy path into owner segments and the local name
fn split_path(name: &str) -> Option<(PathKind, Vec<&str>, &str)> {
    let (kind, separator) = if name.contains('.') {
        (PathKind::Move, ".")
    } else if name.contains("::") {
        (PathKind::Duplicate, "::")
    } else {
        return None;
    };
    let mut segments: Vec<&str> = name.split(separator).collect();
    let local = segments.pop()?;
    if local.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some((kind, segments, local))
}

fn find_owner<'a>(
    files: &'a mut IndexMap<String, Module>,
    location: &TypeLocation,
    nested: &[&str],
) -> Option<&'a mut Declaration> {
    let mut owner = match files.get_mut(&location.file)?.entries.get_mut(&location.key)? {
        DeclEntry::Single(decl) => decl,
        DeclEntry::Overloads(_) => return None,
    };
    for segment in nested {
        owner = match owner.kind.entries_mut()?.get_mut(*segment)? {
            DeclEntry::Single(decl) => decl,
            DeclEntry::Overloads(_) => return None,
        };
    }
    owner.kind.is_container().then_some(owner)
}

/// What a member needs to know about its owner
struct OwnerInfo {
    location: TypeLocation,
    path: Vec<String>,
    name: String,
    base: String,
    shared: Option<Hints>,
    template: Option<Vec<Parameter>>,
}

impl OwnerInfo {
    /// Owner name without a handle suffix, used to recognize self parameters
    fn stem(&self) -> &str {
        OWNER_SUFFIXES
            .iter()
            .find_map(|suffix| self.name.strip_suffix(suffix).filter(|s| !s.is_empty()))
            .unwrap_or(self.name.as_str())
    }

    fn scoped(&self) -> String {
        self.path.join("::")
    }
}

fn call_arguments(params: &[Parameter]) -> String {
    params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
}

/// Adjust a declaration for life inside its owner
fn prepare_member(mut decl: Declaration, local: &str, owner: &OwnerInfo) -> Declaration {
    decl.name = local.to_string();

    if local == owner.name {
        decl.doc = decl.doc.replace("@returns", "@post");
        if decl.proto && !owner.base.is_empty() {
            let source = decl.source_name.clone().unwrap_or_default();
            decl.hints.init = vec![format!("{}({}({}))", owner.base, source, call_arguments(&decl.parameters))];
            decl.hints.body.get_or_insert_with(String::new);
        }
        decl.type_.clear();
        decl.static_ = false;
    } else if decl.is_function() {
        let takes_self = decl.hints.remove_param_this
            || decl
                .parameters
                .first()
                .is_some_and(|param| param.type_.contains(owner.stem()));
        if takes_self && !decl.parameters.is_empty() {
            let this = decl.parameters.remove(0);
            decl.immutable = is_const_qualified(&this.type_);
            decl.static_ = false;
            decl.hints.remove_param_this = false;
        } else {
            decl.static_ = true;
        }
    } else if matches!(decl.kind, DeclKind::Variable) {
        decl.static_ = true;
    }

    if decl.proto {
        decl.proto = false;
        if decl.hints.body.is_none() && decl.hints.delegate.is_none() {
            decl.hints.delegate = decl.source_name.clone();
        }
    }
    decl
}

/// Free function left behind by a `::` duplication
fn make_stub(mut decl: Declaration, local: &str, owner: &OwnerInfo, same_module: bool, ctx: &TransformContext) -> Declaration {
    let source = decl.source_name.clone().unwrap_or_else(|| decl.name.clone());
    decl.name = ctx.make_name(&source);
    decl.proto = true;
    decl.hints.delegate = Some(if local == owner.name {
        owner.scoped()
    } else {
        format!("{}::{}", owner.scoped(), local)
    });
    if let Some(shared) = &owner.shared {
        decl.hints.merge_from(shared);
    }
    if decl.template.is_none() {
        decl.template = owner.template.clone();
    }
    if same_module {
        decl.doc.clear();
    }
    decl
}

fn owner_info(
    files: &mut IndexMap<String, Module>,
    segments: &[&str],
    ctx: &TransformContext,
) -> Option<OwnerInfo> {
    let location = ctx.types.get(segments[0])?.clone();
    let owner = find_owner(files, &location, &segments[1..])?;
    Some(OwnerInfo {
        path: segments.iter().map(|s| s.to_string()).collect(),
        name: owner.name.clone(),
        base: owner.type_.clone(),
        shared: owner.hints.shared.as_deref().cloned(),
        template: owner.template.clone(),
        location,
    })
}

/// Relocate every path-named top-level declaration into its owner
pub fn resolve_hierarchy(files: &mut IndexMap<String, Module>, ctx: &mut TransformContext) {
    let paths: Vec<String> = files.keys().cloned().collect();
    for path in paths {
        let keys: Vec<String> = files[&path]
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .first()
                    .is_some_and(|decl| !matches!(decl.kind, DeclKind::Namespace { .. }))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            relocate(files, &path, &key, ctx);
        }
    }
}

fn relocate(files: &mut IndexMap<String, Module>, path: &str, key: &str, ctx: &mut TransformContext) {
    let Some((kind, segments, local)) = split_path(key) else {
        return;
    };
    let Some(owner) = owner_info(files, &segments, ctx) else {
        debug!(file = path, name = key, "owner not found, keeping declaration at top level");
        return;
    };
    let Some(module) = files.get_mut(path) else {
        return;
    };
    let Some((index, _, entry)) = module.entries.shift_remove_full(key) else {
        return;
    };
    let same_module = owner.location.file == path;
    let decls = entry.into_vec();

    if kind == PathKind::Duplicate {
        for (overload, decl) in decls.iter().enumerate() {
            // The free function keeps the signature it had before per-name deltas
            let base = decl
                .source_name
                .as_ref()
                .and_then(|source| ctx.glossary.get(source))
                .and_then(|entry| entry.as_slice().get(overload))
                .cloned()
                .unwrap_or_else(|| decl.clone());
            let stub = make_stub(base, local, &owner, same_module, ctx);
            if let Some(source) = &decl.source_name {
                ctx.map_name(source, &stub.name);
            }
            match module.entries.get_mut(&stub.name) {
                Some(existing) if existing.is_function() && stub.is_function() => existing.push(stub),
                Some(_) => debug!(file = path, name = %stub.name, "stub name taken, skipping free function"),
                None => {
                    let at = index.min(module.entries.len());
                    module.entries.shift_insert(at, stub.name.clone(), stub.into());
                }
            }
        }
    }

    let Some(owner_decl) = find_owner(files, &owner.location, &segments[1..]) else {
        return;
    };
    let Some(members) = owner_decl.kind.entries_mut() else {
        return;
    };
    for decl in decls {
        let member = prepare_member(decl, local, &owner);
        debug!(owner = %owner.name, member = %member.name, "relocated into owner");
        crate::model::insert_entry(members, member);
    }
}
