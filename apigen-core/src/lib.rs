//! apigen-core: rule-driven header API transformation
//!
//! This library provides:
//! - A declaration model of C headers, loaded from JSON or YAML
//! - Layered transform rules (resources, wrappers, enumerations, namespaces, callbacks)
//! - A transform pipeline producing a C++ wrapper model
//! - Incremental patching of previously generated headers

pub mod config;
pub mod context;
pub mod docs;
pub mod emit;
pub mod hierarchy;
pub mod merge;
pub mod model;
pub mod passes;
pub mod patch;
pub mod render;
pub mod transform;

pub use config::{expand_config_paths, load_transform_spec, ConfigError, FileSpec, TransformSpec};
pub use context::TransformContext;
pub use emit::TransformError;
pub use model::{
    load_model, model_to_json, save_model, ApiModel, DeclEntry, DeclKind, Declaration, DeclarationSet, ModelError,
    Module, ModulePosition, Position,
};
pub use patch::{
    apply_changes, check_module_changes, patch_file, plan_module_patch, Change, ModulePatch, PatchError, PatchSummary,
};
pub use render::{HeaderRenderer, Renderer};
pub use transform::{transform_api, transform_api_with_context};
