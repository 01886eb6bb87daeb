//! Mutable state shared by the stages of one transform run
//!
//! The context lives exactly as long as one call to
//! [`crate::transform::transform_api`]. The blacklist and the name map only
//! ever grow during a run.

use crate::config::{ConfigError, RenameRule, TransformSpec};
use crate::merge::combine_object;
use crate::model::{DeclEntry, VersionTag};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_]\w*").unwrap());

/// Where a container declaration was emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLocation {
    /// Module path in the target model
    pub file: String,
    /// Key of the declaration in the module's top-level set
    pub key: String,
}

#[derive(Debug, Default)]
pub struct TransformContext {
    /// Source names dropped entirely
    pub blacklist: HashSet<String>,
    /// Source name → final dotted/scoped name
    pub name_map: IndexMap<String, String>,
    param_type_map: HashMap<String, String>,
    return_type_map: HashMap<String, String>,
    /// Copy of every emitted entry before its delta, by source name
    pub glossary: HashMap<String, DeclEntry>,
    /// Owner name → location, for hierarchy paths
    pub types: HashMap<String, TypeLocation>,
    pub min_versions: HashMap<String, VersionTag>,
    pub definition_prefix: String,
    prefix_to_remove: Option<Regex>,
    reference_candidate: Option<Regex>,
    rename_rules: Vec<(Regex, String)>,
    doc_rules: Vec<(Regex, String)>,
    /// Deltas registered by the expansion passes
    generated_deltas: HashMap<String, Value>,
    /// Keys whose declarations are already in their final shape
    synthetic: HashSet<String>,
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_rules(rules: &[RenameRule]) -> Result<Vec<(Regex, String)>, ConfigError> {
    rules
        .iter()
        .map(|rule| Ok((compile(&rule.pattern)?, rule.replacement.clone())))
        .collect()
}

impl TransformContext {
    /// Build a context from the configuration, validating regexes and versions
    pub fn new(spec: &TransformSpec) -> Result<Self, ConfigError> {
        let mut ctx = TransformContext {
            definition_prefix: spec.definition_prefix.clone(),
            rename_rules: compile_rules(&spec.rename_rules)?,
            doc_rules: compile_rules(&spec.doc_rules)?,
            ..Default::default()
        };

        if !spec.prefixes.is_empty() {
            let alternatives = spec
                .prefixes
                .iter()
                .map(|prefix| regex::escape(prefix))
                .collect::<Vec<_>>()
                .join("|");
            ctx.prefix_to_remove = Some(compile(&format!("^(?:{alternatives})"))?);
            ctx.reference_candidate = Some(compile(&format!(r"\b((?:{alternatives})\w+)(\(\))?"))?);
        }

        for (tag, version) in &spec.min_versions {
            let parsed = VersionTag::parse(tag, version).ok_or_else(|| ConfigError::InvalidVersion {
                tag: tag.clone(),
                version: version.clone(),
            })?;
            ctx.min_versions.insert(tag.clone(), parsed);
        }

        for (from, to) in &spec.type_map {
            ctx.map_param_type(from, to);
            ctx.map_return_type(from, to);
        }
        for (from, to) in &spec.param_type_map {
            ctx.map_param_type(from, to);
        }
        for (from, to) in &spec.return_type_map {
            ctx.map_return_type(from, to);
        }

        for file in spec.files.values() {
            for name in &file.ignore_entries {
                ctx.blacklist.insert(name.clone());
            }
        }

        Ok(ctx)
    }

    // =========================================================================
    // NAMES
    // =========================================================================

    /// Candidate target name: first matching rename rule, else prefix stripped
    pub fn make_name(&self, source: &str) -> String {
        for (pattern, replacement) in &self.rename_rules {
            if pattern.is_match(source) {
                return pattern.replace(source, replacement.as_str()).into_owned();
            }
        }
        self.strip_prefix(source)
    }

    pub fn strip_prefix(&self, source: &str) -> String {
        match &self.prefix_to_remove {
            Some(prefix) => prefix.replace(source, "").into_owned(),
            None => source.to_string(),
        }
    }

    pub fn map_name(&mut self, source: &str, target: &str) {
        self.name_map.insert(source.to_string(), target.to_string());
    }

    pub fn ignore(&mut self, source: &str) {
        self.blacklist.insert(source.to_string());
    }

    pub fn is_blacklisted(&self, source: &str) -> bool {
        self.blacklist.contains(source)
    }

    /// Pattern for identifiers in doc text that may need rewriting
    pub fn reference_candidate(&self) -> Option<&Regex> {
        self.reference_candidate.as_ref()
    }

    pub fn doc_rules(&self) -> &[(Regex, String)] {
        &self.doc_rules
    }

    // =========================================================================
    // TYPES
    // =========================================================================

    pub fn map_param_type(&mut self, from: &str, to: &str) {
        self.param_type_map.insert(normalize_type(from), to.to_string());
    }

    pub fn map_return_type(&mut self, from: &str, to: &str) {
        self.return_type_map.insert(normalize_type(from), to.to_string());
    }

    /// Register a mapping for both directions unless one already exists
    pub fn map_type_if_absent(&mut self, from: &str, to: &str) {
        let key = normalize_type(from);
        self.param_type_map.entry(key.clone()).or_insert_with(|| to.to_string());
        self.return_type_map.entry(key).or_insert_with(|| to.to_string());
    }

    pub fn param_type(&self, type_: &str) -> String {
        substitute_type(type_, &self.param_type_map)
    }

    pub fn return_type(&self, type_: &str) -> String {
        substitute_type(type_, &self.return_type_map)
    }

    pub fn register_type(&mut self, name: &str, file: &str) {
        self.types.insert(
            name.to_string(),
            TypeLocation {
                file: file.to_string(),
                key: name.to_string(),
            },
        );
    }

    // =========================================================================
    // PASS BOOKKEEPING
    // =========================================================================

    /// Record a delta for a source name, combining with earlier ones
    pub fn add_delta(&mut self, source: &str, delta: Value) {
        let merged = match self.generated_deltas.remove(source) {
            Some(existing) => combine_object(existing, delta),
            None => delta,
        };
        self.generated_deltas.insert(source.to_string(), merged);
    }

    pub fn generated_delta(&self, source: &str) -> Option<&Value> {
        self.generated_deltas.get(source)
    }

    pub fn mark_synthetic(&mut self, key: &str) {
        self.synthetic.insert(key.to_string());
    }

    pub fn is_synthetic(&self, key: &str) -> bool {
        self.synthetic.contains(key)
    }
}

/// Canonical spelling of a type string: single spaces, `*` runs spaced once
///
/// `Foo*` → `Foo *`, `const  char**` → `const char **`
pub fn normalize_type(type_: &str) -> String {
    let mut out = String::with_capacity(type_.len() + 2);
    for ch in type_.trim().chars() {
        match ch {
            '*' => {
                if !out.is_empty() && !out.ends_with('*') && !out.ends_with(' ') {
                    out.push(' ');
                }
                out.push('*');
            }
            c if c.is_whitespace() => {
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            c => {
                if out.ends_with('*') {
                    out.push(' ');
                }
                out.push(c);
            }
        }
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out
}

/// Whole-type lookup first, then identifier-wise replacement
fn substitute_type(type_: &str, map: &HashMap<String, String>) -> String {
    if type_.is_empty() {
        return String::new();
    }
    let normalized = normalize_type(type_);
    if let Some(mapped) = map.get(&normalized) {
        return mapped.clone();
    }
    let replaced = IDENTIFIER_RE.replace_all(type_, |caps: &regex::Captures| {
        map.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_string())
    });
    replaced.into_owned()
}

/// True when the type is `const`-qualified at its outermost level
pub fn is_const_qualified(type_: &str) -> bool {
    let trimmed = type_.trim_start();
    trimmed.starts_with("const") && !trimmed.starts_with("constexpr")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileSpec;

    fn spec() -> TransformSpec {
        let mut spec = TransformSpec {
            prefixes: vec!["SDL_".to_string()],
            rename_rules: vec![RenameRule {
                pattern: "^SDL_GL_(.*)$".to_string(),
                replacement: "GL_$1".to_string(),
            }],
            ..Default::default()
        };
        spec.min_versions.insert("SDL".to_string(), "3.2.0".to_string());
        spec.type_map.insert("SDL_Point".to_string(), "Point".to_string());
        spec.files.insert(
            "a.h".to_string(),
            FileSpec {
                ignore_entries: vec!["SDL_Hidden".to_string()],
                ..Default::default()
            },
        );
        spec
    }

    #[test]
    fn test_make_name() {
        let ctx = TransformContext::new(&spec()).unwrap();
        assert_eq!(ctx.make_name("SDL_CreateWindow"), "CreateWindow");
        assert_eq!(ctx.make_name("SDL_GL_SwapWindow"), "GL_SwapWindow");
        assert_eq!(ctx.make_name("Other"), "Other");
    }

    #[test]
    fn test_blacklist_seeded_from_files() {
        let ctx = TransformContext::new(&spec()).unwrap();
        assert!(ctx.is_blacklisted("SDL_Hidden"));
        assert!(!ctx.is_blacklisted("SDL_Shown"));
    }

    #[test]
    fn test_invalid_regex_and_version() {
        let mut bad = spec();
        bad.rename_rules[0].pattern = "(".to_string();
        assert!(matches!(TransformContext::new(&bad), Err(ConfigError::InvalidRegex { .. })));

        let mut bad = spec();
        bad.min_versions.insert("IMG".to_string(), "three".to_string());
        assert!(matches!(TransformContext::new(&bad), Err(ConfigError::InvalidVersion { .. })));
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("Foo*"), "Foo *");
        assert_eq!(normalize_type("Foo *"), "Foo *");
        assert_eq!(normalize_type("const  char**"), "const char **");
        assert_eq!(normalize_type(" int "), "int");
        assert_eq!(normalize_type("char * const*"), "char * const *");
    }

    #[test]
    fn test_type_substitution() {
        let mut ctx = TransformContext::new(&spec()).unwrap();
        ctx.map_param_type("SDL_Window*", "WindowRef");
        assert_eq!(ctx.param_type("SDL_Window *"), "WindowRef");
        assert_eq!(ctx.param_type("const SDL_Point *"), "const Point *");
        assert_eq!(ctx.return_type("SDL_Point"), "Point");
        assert_eq!(ctx.param_type("int"), "int");
        assert_eq!(ctx.param_type(""), "");
    }

    #[test]
    fn test_map_type_if_absent_keeps_existing() {
        let mut ctx = TransformContext::new(&spec()).unwrap();
        ctx.map_type_if_absent("SDL_Point", "Other");
        assert_eq!(ctx.param_type("SDL_Point"), "Point");
    }

    #[test]
    fn test_generated_deltas_combine() {
        let mut ctx = TransformContext::default();
        ctx.add_delta("f", serde_json::json!({"name": "A.f"}));
        ctx.add_delta("f", serde_json::json!({"proto": true}));
        assert_eq!(
            ctx.generated_delta("f"),
            Some(&serde_json::json!({"name": "A.f", "proto": true}))
        );
    }

    #[test]
    fn test_const_qualified() {
        assert!(is_const_qualified("const Foo *"));
        assert!(is_const_qualified("constFooBase*"));
        assert!(!is_const_qualified("Foo *"));
        assert!(!is_const_qualified("constexpr int"));
    }
}
