//! Entry emission
//!
//! Walks a module's expanded source declarations in order and builds the
//! target set: blacklisted names are dropped, insertion points are spliced
//! in, names and types are rewritten and per-name deltas are merged.

use crate::config::{ConfigError, FileSpec, BEGIN_ANCHOR, END_ANCHOR};
use crate::context::TransformContext;
use crate::merge::combine_object;
use crate::model::{DeclEntry, DeclKind, Declaration, DeclarationSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// `@returns X on success or Y on failure` as written in the source docs
static RETURNS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@returns?\s+(.+?)\s+on\s+success\s+or\s+(.+?)\s+on\s+failure[.;,]?[^\n]*").unwrap()
});

/// Errors aborting a transform run
#[derive(Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Name collision in {file}: {name} is declared twice")]
    NameCollision { file: String, name: String },
}

/// Build the target declaration set of one module
pub fn transform_entries(
    path: &str,
    source: &DeclarationSet,
    file: &FileSpec,
    ctx: &mut TransformContext,
) -> Result<DeclarationSet, TransformError> {
    let mut target = DeclarationSet::new();

    include(&mut target, path, file.include_before.get(BEGIN_ANCHOR), ctx)?;
    include(&mut target, path, file.include_after.get(BEGIN_ANCHOR), ctx)?;

    for (key, entry) in source {
        if ctx.is_blacklisted(key) {
            debug!(file = path, name = %key, "skipping blacklisted entry");
            continue;
        }
        include(&mut target, path, file.include_before.get(key), ctx)?;
        emit_entry(&mut target, path, key, entry, file, ctx)?;
        include(&mut target, path, file.include_after.get(key), ctx)?;
    }

    include(&mut target, path, file.include_before.get(END_ANCHOR), ctx)?;
    include(&mut target, path, file.include_after.get(END_ANCHOR), ctx)?;

    Ok(target)
}

fn include(
    target: &mut DeclarationSet,
    path: &str,
    decls: Option<&Vec<Declaration>>,
    ctx: &mut TransformContext,
) -> Result<(), TransformError> {
    for decl in decls.into_iter().flatten() {
        insert_target(target, path, decl.clone(), ctx)?;
    }
    Ok(())
}

/// Insert under the declaration's final name; only functions may overload
fn insert_target(
    target: &mut DeclarationSet,
    path: &str,
    decl: Declaration,
    ctx: &mut TransformContext,
) -> Result<(), TransformError> {
    if decl.kind.is_container() && !matches!(decl.kind, DeclKind::Namespace { .. }) {
        ctx.register_type(&decl.name, path);
    }
    match target.get_mut(&decl.name) {
        Some(existing) if existing.is_function() && decl.is_function() => existing.push(decl),
        Some(_) => {
            return Err(TransformError::NameCollision {
                file: path.to_string(),
                name: decl.name,
            })
        }
        None => {
            target.insert(decl.name.clone(), decl.into());
        }
    }
    Ok(())
}

fn emit_entry(
    target: &mut DeclarationSet,
    path: &str,
    key: &str,
    entry: &DeclEntry,
    file: &FileSpec,
    ctx: &mut TransformContext,
) -> Result<(), TransformError> {
    let synthetic = ctx.is_synthetic(key);
    let mut decls: Vec<Declaration> = if synthetic {
        entry.iter().cloned().collect()
    } else {
        entry
            .iter()
            .map(|decl| transform_entry(key, decl, file.enable_exceptions, ctx))
            .collect()
    };
    ctx.glossary.insert(key.to_string(), DeclEntry::from_vec(decls.clone()));

    let mut links = Vec::new();
    for delta in [ctx.generated_delta(key).cloned(), file.transform.get(key).cloned()]
        .into_iter()
        .flatten()
    {
        decls = apply_delta(key, decls, delta, &mut links)?;
    }

    let Some(first) = decls.first() else {
        return Ok(());
    };
    if !(synthetic && ctx.name_map.contains_key(key)) {
        ctx.map_name(key, &first.name);
    }

    let linked: Vec<Declaration> = links
        .into_iter()
        .flat_map(|link| decls.iter().map(move |decl| (decl.clone(), link.clone())))
        .map(|(decl, link)| merge_delta(key, &decl, link))
        .collect::<Result<_, _>>()?;

    for decl in decls.into_iter().chain(linked) {
        insert_target(target, path, decl, ctx)?;
    }
    Ok(())
}

/// Rewrite one source declaration: name, types, exception signalling
pub fn transform_entry(key: &str, decl: &Declaration, exceptions: bool, ctx: &TransformContext) -> Declaration {
    let mut decl = rewrite_entry(key, decl, exceptions, ctx);
    decl.source_name.get_or_insert_with(|| key.to_string());
    decl
}

/// Nested members keep whatever source name they came with
fn rewrite_entry(key: &str, decl: &Declaration, exceptions: bool, ctx: &TransformContext) -> Declaration {
    let mut decl = decl.clone();
    decl.name = ctx.make_name(key);

    match &mut decl.kind {
        DeclKind::Function | DeclKind::Callback => {
            decl.type_ = ctx.return_type(&decl.type_);
            for param in &mut decl.parameters {
                param.type_ = ctx.param_type(&param.type_);
            }
        }
        DeclKind::Alias | DeclKind::Variable => {
            decl.type_ = ctx.param_type(&decl.type_);
        }
        DeclKind::Definition => {
            let prefix = &ctx.definition_prefix;
            if !prefix.is_empty() && !decl.name.starts_with(prefix.as_str()) {
                decl.name = format!("{prefix}{}", decl.name);
            }
        }
        DeclKind::Enum { entries }
        | DeclKind::Struct { entries }
        | DeclKind::Union { entries }
        | DeclKind::Namespace { entries } => {
            let mut nested = DeclarationSet::new();
            for (child_key, child) in entries.iter() {
                if ctx.is_blacklisted(child_key) {
                    continue;
                }
                for child_decl in child.iter() {
                    crate::model::insert_entry(&mut nested, rewrite_entry(child_key, child_decl, exceptions, ctx));
                }
            }
            *entries = nested;
        }
        DeclKind::ForwardDeclaration => {}
    }

    if exceptions && decl.is_function() {
        rewrite_exceptions(&mut decl);
    }
    decl
}

/// Turn a sentinel-returning function into one that raises on failure
fn rewrite_exceptions(decl: &mut Declaration) {
    let Some(caps) = RETURNS_RE.captures(&decl.doc) else {
        return;
    };
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let success = caps[1].trim().to_string();

    let sentinel = matches!(decl.type_.as_str(), "bool" | "int");
    let replacement = if sentinel {
        decl.type_ = "void".to_string();
        "@throws Error on failure.".to_string()
    } else {
        format!("@returns {success} on success.\n@throws Error on failure.")
    };
    decl.doc.replace_range(whole, &replacement);
    decl.hints.may_fail = true;
}

fn merge_delta(key: &str, decl: &Declaration, delta: Value) -> Result<Declaration, TransformError> {
    let invalid = |message: String| ConfigError::InvalidDelta {
        name: key.to_string(),
        message,
    };
    let base = serde_json::to_value(decl).map_err(|e| invalid(e.to_string()))?;
    let merged = combine_object(base, delta);
    serde_json::from_value(merged).map_err(|e| invalid(e.to_string()).into())
}

/// Merge a delta onto an entry. An object applies to every overload, an
/// array applies element-wise. `link` entries are collected, not merged.
fn apply_delta(
    key: &str,
    decls: Vec<Declaration>,
    delta: Value,
    links: &mut Vec<Value>,
) -> Result<Vec<Declaration>, TransformError> {
    match delta {
        Value::Object(mut object) => {
            match object.shift_remove("link") {
                Some(Value::Array(items)) => links.extend(items),
                Some(link @ Value::Object(_)) => links.push(link),
                Some(other) => {
                    return Err(ConfigError::InvalidDelta {
                        name: key.to_string(),
                        message: format!("link must be an object or a list, got {other}"),
                    }
                    .into())
                }
                None => {}
            }
            let delta = Value::Object(object);
            decls.iter().map(|decl| merge_delta(key, decl, delta.clone())).collect()
        }
        Value::Array(items) => {
            let template = decls.first().cloned();
            let mut result = Vec::with_capacity(decls.len().max(items.len()));
            let mut items = items.into_iter();
            for decl in &decls {
                match items.next() {
                    Some(item) => result.push(merge_delta(key, decl, item)?),
                    None => result.push(decl.clone()),
                }
            }
            for item in items {
                let Some(template) = &template else {
                    break;
                };
                result.push(merge_delta(key, template, item)?);
            }
            Ok(result)
        }
        Value::Null => Ok(decls),
        other => Err(ConfigError::InvalidDelta {
            name: key.to_string(),
            message: format!("expected an object or a list, got {other}"),
        }
        .into()),
    }
}
