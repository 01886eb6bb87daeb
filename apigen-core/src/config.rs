//! Transform configuration
//!
//! A [`TransformSpec`] is plain data: global rename rules and type maps plus
//! one [`FileSpec`] per generated header. Several configuration files may be
//! layered; they are combined as untyped values first (see [`crate::merge`])
//! and deserialized once at the end.

use crate::merge::merge_layers;
use crate::model::Declaration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Anchor addressing the start of a module in `includeBefore`/`includeAfter`
pub const BEGIN_ANCHOR: &str = "__begin";
/// Anchor addressing the end of a module in `includeBefore`/`includeAfter`
pub const END_ANCHOR: &str = "__end";

/// Errors in configuration files or values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed config {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
    #[error("Invalid version '{version}' for tag {tag}")]
    InvalidVersion { tag: String, version: String },
    #[error("Invalid delta for {name}: {message}")]
    InvalidDelta { name: String, message: String },
}

/// Regex rewrite rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenameRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// Top-level transform configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformSpec {
    /// Prefixes stripped from source names
    pub prefixes: Vec<String>,
    /// Tried before prefix stripping; the first match wins
    pub rename_rules: Vec<RenameRule>,
    /// Applied to doc text after cross-reference rewriting
    pub doc_rules: Vec<RenameRule>,
    /// Minimum supported version per tag, e.g. `SDL: "3.2.0"`
    pub min_versions: IndexMap<String, String>,
    /// Registered for both parameters and return values
    pub type_map: IndexMap<String, String>,
    pub param_type_map: IndexMap<String, String>,
    pub return_type_map: IndexMap<String, String>,
    /// Prefix given to `definition` declarations
    pub definition_prefix: String,
    pub files: IndexMap<String, FileSpec>,
}

/// Per-header transform configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    pub name: Option<String>,
    pub doc: Option<String>,
    pub ignore_entries: Vec<String>,
    pub include_before: IndexMap<String, Vec<Declaration>>,
    pub include_after: IndexMap<String, Vec<Declaration>>,
    /// Source name → delta merged onto the emitted declaration
    pub transform: IndexMap<String, Value>,
    pub resources: IndexMap<String, ResourceSpec>,
    pub wrappers: IndexMap<String, WrapperSpec>,
    pub enumerations: IndexMap<String, EnumerationSpec>,
    /// Source name prefix → namespace name
    pub namespaces_map: IndexMap<String, String>,
    pub enable_exceptions: bool,
}

/// How a resource's raw pointer is replaced in other signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlePolicy {
    /// Keep the raw pointer
    None,
    /// Non-owning reference handle
    #[default]
    Ref,
    /// Owning handle
    Unique,
}

/// Scoped lock configuration for a resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LockSpec {
    pub lock: String,
    pub unlock: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSpec {
    pub name: Option<String>,
    /// Free function; discovered by name when absent
    pub free: Option<String>,
    pub param_policy: HandlePolicy,
    pub return_policy: HandlePolicy,
    pub lock: Option<LockSpec>,
    /// Explicit source name → member name mapping
    pub entries: IndexMap<String, String>,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            name: None,
            free: None,
            param_policy: HandlePolicy::Ref,
            return_policy: HandlePolicy::Unique,
            lock: None,
            entries: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WrapperSpec {
    pub name: Option<String>,
    /// Value tested by the boolean validity check
    pub invalid_value: Option<String>,
    pub comparable: bool,
    pub ordered: bool,
    /// Generate the conversion back to the wrapped value
    pub unwrap: bool,
    /// Generate getter/setter pairs for struct fields
    pub reflect: bool,
}

impl Default for WrapperSpec {
    fn default() -> Self {
        Self {
            name: None,
            invalid_value: None,
            comparable: true,
            ordered: false,
            unwrap: true,
            reflect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnumerationSpec {
    pub name: Option<String>,
    /// Prefix shared by the value definitions
    pub prefix: Option<String>,
    /// Replacement for `prefix` in the value names
    pub new_prefix: Option<String>,
    /// Explicit value list; scanned from the source when empty
    pub values: Vec<String>,
}

impl TransformSpec {
    /// Configuration of one file, empty when not configured
    pub fn file(&self, path: &str) -> FileSpec {
        self.files.get(path).cloned().unwrap_or_default()
    }

    /// Deserialize from an already merged configuration value
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Read one configuration file as an untyped value, format by extension
pub fn read_config_value(path: &Path) -> Result<Value, ConfigError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()),
        Some("yaml") | Some("yml") => serde_yaml::from_str::<Value>(&content).map_err(|e| e.to_string()),
        Some("toml") => toml::from_str::<Value>(&content).map_err(|e| e.to_string()),
        other => {
            return Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: display,
        message,
    })
}

/// Load and layer configuration files, later files taking precedence
pub fn load_transform_spec<P: AsRef<Path>>(paths: &[P]) -> Result<TransformSpec, ConfigError> {
    let layers = paths
        .iter()
        .map(|path| read_config_value(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    TransformSpec::from_value(merge_layers(layers))
}

/// Expand glob patterns to configuration paths, keeping plain paths as-is
pub fn expand_config_paths(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') {
            match glob::glob(pattern) {
                Ok(entries) => {
                    let mut matched: Vec<PathBuf> =
                        entries.flatten().filter(|entry| entry.is_file()).collect();
                    // Layering order must not depend on directory iteration order
                    matched.sort();
                    paths.extend(matched);
                }
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "invalid glob pattern");
                }
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec: TransformSpec = serde_json::from_str(r#"{"files": {"a.h": {"wrappers": {"X": {}}}}}"#).unwrap();
        let file = spec.file("a.h");
        let wrapper = &file.wrappers["X"];
        assert!(wrapper.comparable);
        assert!(wrapper.unwrap);
        assert!(!wrapper.ordered);
        assert_eq!(spec.file("missing.h"), FileSpec::default());
    }

    #[test]
    fn test_resource_policies() {
        let spec: ResourceSpec =
            serde_json::from_str(r#"{"paramPolicy": "unique", "returnPolicy": "none"}"#).unwrap();
        assert_eq!(spec.param_policy, HandlePolicy::Unique);
        assert_eq!(spec.return_policy, HandlePolicy::None);
        assert_eq!(ResourceSpec::default().param_policy, HandlePolicy::Ref);
    }

    #[test]
    fn test_include_entries_are_declarations() {
        let spec: FileSpec = serde_json::from_str(
            r#"{"includeAfter": {"__begin": [{"kind": "alias", "name": "Uint8", "type": "unsigned char"}]}}"#,
        )
        .unwrap();
        assert_eq!(spec.include_after[BEGIN_ANCHOR][0].name, "Uint8");
    }

    #[test]
    fn test_load_layers_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let extra = dir.path().join("extra.json");
        let local = dir.path().join("local.toml");
        fs::write(&base, "prefixes: [SDL_]\nminVersions:\n  SDL: 3.2.0\n").unwrap();
        fs::write(&extra, r#"{"prefixes": ["IMG_"], "minVersions": {"SDL": "3.1.0"}}"#).unwrap();
        fs::write(&local, "definitionPrefix = \"SDLPP_\"\n").unwrap();

        let spec = load_transform_spec(&[base, extra, local]).unwrap();
        assert_eq!(spec.prefixes, vec!["SDL_", "IMG_"]);
        assert_eq!(spec.min_versions["SDL"], "3.1.0");
        assert_eq!(spec.definition_prefix, "SDLPP_");
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "x=1").unwrap();
        assert!(matches!(read_config_value(&path), Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_expand_config_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), "{}").unwrap();
        fs::write(dir.path().join("a.yaml"), "{}").unwrap();
        let pattern = format!("{}/*.yaml", dir.path().display());
        let paths = expand_config_paths(&[pattern, "plain.json".to_string()]);
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("a.yaml"));
        assert!(paths[1].ends_with("b.yaml"));
        assert_eq!(paths[2], PathBuf::from("plain.json"));
    }
}
