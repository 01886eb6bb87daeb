//! Doc cross-references and version gating
//!
//! Runs after hierarchy resolution so every name in the name map is final.

use crate::context::TransformContext;
use crate::model::{visit_declarations_mut, Declaration, Module, VersionTag};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SINCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@since\s+(\w+)\s+(\d+)\.(\d+)\.(\d+)").unwrap());

pub fn resolve_docs(files: &mut IndexMap<String, Module>, ctx: &TransformContext) {
    for module in files.values_mut() {
        module.doc = rewrite_references(&module.doc, ctx);
        visit_declarations_mut(&mut module.entries, &mut |decl| {
            decl.doc = rewrite_references(&decl.doc, ctx);
            resolve_since(decl, ctx);
        });
    }
}

/// Replace known source identifiers with their final names, then apply doc rules.
/// Unknown identifiers are left as written.
pub fn rewrite_references(doc: &str, ctx: &TransformContext) -> String {
    if doc.is_empty() {
        return String::new();
    }
    let mut text = match ctx.reference_candidate() {
        Some(candidate) => candidate
            .replace_all(doc, |caps: &Captures| match ctx.name_map.get(&caps[1]) {
                Some(target) => format!("{}{}", target, caps.get(2).map_or("", |m| m.as_str())),
                None => caps[0].to_string(),
            })
            .into_owned(),
        None => doc.to_string(),
    };
    for (pattern, replacement) in ctx.doc_rules() {
        text = pattern.replace_all(&text, replacement.as_str()).into_owned();
    }
    text
}

/// First `@since TAG x.y.z` marker of a doc text
pub fn parse_since(doc: &str) -> Option<VersionTag> {
    let caps = SINCE_RE.captures(doc)?;
    Some(VersionTag::new(
        &caps[1],
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

/// Keep the marker only when newer than the configured minimum for its tag.
/// Tags without a configured minimum leave `since` as it was.
fn resolve_since(decl: &mut Declaration, ctx: &TransformContext) {
    let Some(version) = parse_since(&decl.doc) else {
        return;
    };
    let Some(minimum) = ctx.min_versions.get(&version.tag) else {
        return;
    };
    decl.since = version.is_newer_than(minimum).then_some(version);
}
