//! Transform orchestration
//!
//! ```text
//! for each module: expansion passes
//! for each module: register declared types
//! for each module: emission            <- every owner is now registered
//! all modules:     hierarchy resolution
//! all modules:     doc & version resolution
//! ```

use crate::config::{FileSpec, TransformSpec};
use crate::context::TransformContext;
use crate::docs::resolve_docs;
use crate::emit::{transform_entries, TransformError};
use crate::hierarchy::resolve_hierarchy;
use crate::model::{ApiModel, DeclarationSet, Module};
use crate::passes::{expand_module, register_declared_types};
use indexmap::IndexMap;
use tracing::info;

/// Transform a source model with a fresh context
pub fn transform_api(source: &ApiModel, spec: &TransformSpec) -> Result<ApiModel, TransformError> {
    let mut ctx = TransformContext::new(spec)?;
    transform_api_with_context(source, spec, &mut ctx)
}

/// Transform a source model, leaving the final context state to the caller
pub fn transform_api_with_context(
    source: &ApiModel,
    spec: &TransformSpec,
    ctx: &mut TransformContext,
) -> Result<ApiModel, TransformError> {
    let mut expanded: Vec<(&String, &Module, FileSpec, DeclarationSet)> = Vec::with_capacity(source.files.len());
    for (path, module) in &source.files {
        let file = spec.file(path);
        let mut entries = module.entries.clone();
        expand_module(&mut entries, &file, ctx);
        expanded.push((path, module, file, entries));
    }

    for (_, _, _, entries) in &expanded {
        register_declared_types(entries, ctx);
    }

    let mut files = IndexMap::with_capacity(expanded.len());
    for (path, module, file, entries) in &expanded {
        let target = Module {
            name: file.name.clone().unwrap_or_else(|| module.name.clone()),
            doc: file.doc.clone().unwrap_or_else(|| module.doc.clone()),
            entries: transform_entries(path, entries, file, ctx)?,
            position: None,
        };
        info!(file = %path, entries = target.entries.len(), "emitted module");
        files.insert((*path).clone(), target);
    }

    resolve_hierarchy(&mut files, ctx);
    resolve_docs(&mut files, ctx);

    Ok(ApiModel { files })
}
