//! Namespaces
//!
//! Gathers every declaration whose source name shares a prefix into one
//! `namespace`, placed where the first member was.

use super::insert_at;
use crate::config::FileSpec;
use crate::context::TransformContext;
use crate::model::{DeclEntry, DeclKind, Declaration, DeclarationSet};
use tracing::warn;

pub fn expand_namespaces(entries: &mut DeclarationSet, file: &FileSpec, ctx: &mut TransformContext) {
    for (prefix, namespace) in &file.namespaces_map {
        expand_namespace(entries, prefix, namespace, ctx);
    }
}

/// Type of a constant inferred from its literal value
fn literal_type(value: &str) -> &'static str {
    let value = value.trim();
    if value.starts_with('"') {
        "const char *"
    } else if value.starts_with('\'') {
        "char"
    } else if value.parse::<f64>().is_ok() && (value.contains('.') || value.contains('e')) && !value.starts_with("0x") {
        "double"
    } else if is_integer_literal(value) {
        "int"
    } else {
        "auto"
    }
}

fn is_integer_literal(value: &str) -> bool {
    let digits = value.trim_start_matches('-').trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn member(key: &str, local: &str, decl: Declaration) -> Declaration {
    let mut decl = decl;
    if matches!(decl.kind, DeclKind::Definition) {
        let type_ = decl.value.as_deref().map_or("auto", literal_type);
        let mut constant = Declaration::new(DeclKind::Variable, local)
            .with_type(type_)
            .with_value(key)
            .with_doc(&decl.doc);
        constant.constexpr = true;
        constant.since = decl.since.take();
        decl = constant;
    }
    decl.name = local.to_string();
    decl.source_name = Some(key.to_string());
    decl
}

fn expand_namespace(entries: &mut DeclarationSet, prefix: &str, namespace: &str, ctx: &mut TransformContext) {
    let keys: Vec<String> = entries
        .keys()
        .filter(|key| key.starts_with(prefix) && key.len() > prefix.len() && !ctx.is_blacklisted(key))
        .cloned()
        .collect();
    let Some(first) = keys.first().and_then(|key| entries.get_index_of(key)) else {
        warn!(prefix = prefix, namespace = namespace, "no declarations for namespace");
        return;
    };

    let mut members = DeclarationSet::new();
    for key in &keys {
        let Some(entry) = entries.shift_remove(key) else {
            continue;
        };
        let local = &key[prefix.len()..];
        let decls: Vec<Declaration> = entry.into_vec().into_iter().map(|decl| member(key, local, decl)).collect();
        members.insert(local.to_string(), DeclEntry::from_vec(decls));
        ctx.map_name(key, &format!("{namespace}::{local}"));
    }

    let merge_into_existing = entries
        .get(namespace)
        .and_then(DeclEntry::first)
        .is_some_and(|decl| matches!(decl.kind, DeclKind::Namespace { .. }));
    if merge_into_existing {
        if let Some(DeclEntry::Single(decl)) = entries.get_mut(namespace) {
            if let Some(nested) = decl.kind.entries_mut() {
                nested.extend(members);
            }
        }
        return;
    }

    let mut decl = Declaration::new(DeclKind::Namespace { entries: members }, namespace);
    decl.source_name = Some(namespace.to_string());
    insert_at(entries, first, namespace.to_string(), decl.into());
}
