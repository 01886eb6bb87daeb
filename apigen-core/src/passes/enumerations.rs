//! Enumerations
//!
//! Values of a C enum, or of a family of `#define`s sharing a prefix, become
//! typed constants following the enumeration's alias.

use super::{insert_after, replace_at};
use crate::config::{EnumerationSpec, FileSpec};
use crate::context::TransformContext;
use crate::model::{DeclEntry, DeclKind, Declaration, DeclarationSet};
use tracing::{debug, warn};

pub fn expand_enumerations(entries: &mut DeclarationSet, file: &FileSpec, ctx: &mut TransformContext) {
    for (source, spec) in &file.enumerations {
        expand_enumeration(entries, source, spec, ctx);
    }
}

/// A value to emit as a constant, with the doc it carried in the source
struct EnumValue {
    source: String,
    doc: String,
    since: Option<crate::model::VersionTag>,
}

fn value_name(source: &str, spec: &EnumerationSpec, ctx: &TransformContext) -> String {
    if let (Some(prefix), Some(new_prefix)) = (&spec.prefix, &spec.new_prefix) {
        if let Some(rest) = source.strip_prefix(prefix.as_str()) {
            return format!("{new_prefix}{rest}");
        }
    }
    ctx.make_name(source)
}

fn collect_values(entries: &DeclarationSet, source: &str, spec: &EnumerationSpec) -> Vec<EnumValue> {
    let from_decl = |key: &str, decl: Option<&Declaration>| EnumValue {
        source: key.to_string(),
        doc: decl.map(|d| d.doc.clone()).unwrap_or_default(),
        since: decl.and_then(|d| d.since.clone()),
    };

    if !spec.values.is_empty() {
        let members = entries.get(source).and_then(DeclEntry::first).and_then(|d| d.kind.entries());
        return spec
            .values
            .iter()
            .map(|key| {
                let decl = members
                    .and_then(|m| m.get(key))
                    .or_else(|| entries.get(key))
                    .and_then(DeclEntry::first);
                from_decl(key, decl)
            })
            .collect();
    }

    if let Some(DeclKind::Enum { entries: members }) = entries.get(source).and_then(DeclEntry::first).map(|d| &d.kind) {
        if !members.is_empty() {
            return members.iter().map(|(key, entry)| from_decl(key, entry.first())).collect();
        }
    }

    let Some(prefix) = &spec.prefix else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|(key, entry)| {
            key.starts_with(prefix.as_str())
                && entry.first().is_some_and(|d| matches!(d.kind, DeclKind::Definition))
        })
        .map(|(key, entry)| from_decl(key, entry.first()))
        .collect()
}

fn expand_enumeration(entries: &mut DeclarationSet, source: &str, spec: &EnumerationSpec, ctx: &mut TransformContext) {
    let Some(index) = entries.get_index_of(source) else {
        warn!(enumeration = source, "enumeration type not found, leaving it untouched");
        return;
    };
    let target = spec.name.clone().unwrap_or_else(|| ctx.make_name(source));
    let values = collect_values(entries, source, spec);
    if values.is_empty() {
        warn!(enumeration = source, "no values found for enumeration");
    }

    let mut anchor = source.to_string();
    if let Some(original) = entries[index].first().cloned() {
        if target != source {
            let mut alias = Declaration::new(DeclKind::Alias, &target)
                .with_type(source)
                .with_doc(&original.doc);
            alias.source_name = Some(source.to_string());
            alias.since = original.since;
            replace_at(entries, index, target.clone(), alias.into());
            ctx.mark_synthetic(&target);
            ctx.map_name(source, &target);
            ctx.map_param_type(source, &target);
            ctx.map_return_type(source, &target);
            anchor = target.clone();
        }
    }

    for value in values {
        if ctx.is_blacklisted(&value.source) {
            debug!(enumeration = source, value = %value.source, "skipping ignored value");
            continue;
        }
        let name = value_name(&value.source, spec, ctx);
        let consumed = entries
            .get(&value.source)
            .and_then(DeclEntry::first)
            .is_some_and(|d| matches!(d.kind, DeclKind::Definition));
        if consumed {
            entries.shift_remove(&value.source);
        } else if let Some(members) = entries
            .get_mut(source)
            .and_then(|entry| entry.iter_mut().next())
            .and_then(|decl| decl.kind.entries_mut())
        {
            members.shift_remove(&value.source);
        }

        let mut constant = Declaration::new(DeclKind::Variable, &name)
            .with_type(&target)
            .with_value(&value.source)
            .with_doc(&value.doc);
        constant.constexpr = true;
        constant.source_name = Some(value.source.clone());
        constant.since = value.since;

        insert_after(entries, &anchor, name.clone(), constant.into());
        ctx.mark_synthetic(&name);
        ctx.map_name(&value.source, &name);
        anchor = name;
    }
}
