//! Declaration model shared by every stage of the pipeline
//!
//! The parser produces an [`ApiModel`] describing the source headers, the
//! transform stages build a second, independent [`ApiModel`] for the target,
//! and the patch engine reconciles the two.
//!
//! ## Serialized form
//! ```json
//! {"files": {"SDL_foo.h": {"name": "foo", "entries": {
//!     "SDL_Foo": {"kind": "struct", "name": "SDL_Foo"},
//!     "SDL_Open": [{"kind": "function", "name": "SDL_Open", "type": "SDL_Foo *"}]
//! }}}}
//! ```
//! A set value is either one declaration object or an array (overload group).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use strum_macros::IntoStaticStr;
use thiserror::Error;

/// Ordered name → declaration(s) mapping. Insertion order is emission order.
pub type DeclarationSet = IndexMap<String, DeclEntry>;

/// Errors raised while loading or saving a model file
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed model {path}: {message}")]
    Decode { path: String, message: String },
    #[error("Failed to encode model: {0}")]
    Encode(String),
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// DECLARATIONS
// =============================================================================

/// Kind of a declaration, with the payload only container kinds carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeclKind {
    Alias,
    Callback,
    Definition,
    Enum {
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        entries: DeclarationSet,
    },
    ForwardDeclaration,
    Function,
    Struct {
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        entries: DeclarationSet,
    },
    Union {
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        entries: DeclarationSet,
    },
    Variable,
    Namespace {
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        entries: DeclarationSet,
    },
}

impl DeclKind {
    /// Kebab-case kind name as it appears in model files
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_container(&self) -> bool {
        self.entries().is_some()
    }

    pub fn entries(&self) -> Option<&DeclarationSet> {
        match self {
            DeclKind::Enum { entries }
            | DeclKind::Struct { entries }
            | DeclKind::Union { entries }
            | DeclKind::Namespace { entries } => Some(entries),
            _ => None,
        }
    }

    pub fn entries_mut(&mut self) -> Option<&mut DeclarationSet> {
        match self {
            DeclKind::Enum { entries }
            | DeclKind::Struct { entries }
            | DeclKind::Union { entries }
            | DeclKind::Namespace { entries } => Some(entries),
            _ => None,
        }
    }

    pub fn new_struct() -> Self {
        DeclKind::Struct {
            entries: DeclarationSet::new(),
        }
    }

    pub fn new_namespace() -> Self {
        DeclKind::Namespace {
            entries: DeclarationSet::new(),
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function, callback or template parameter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Parameter {
    pub fn new(name: &str, type_: &str) -> Self {
        Self {
            name: name.to_string(),
            type_: type_.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// Line positions of a declaration in its source buffer.
///
/// Lines are 1-based, `end` is exclusive. `[begin, decl)` is the doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub begin: usize,
    pub decl: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_begin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_end: Option<usize>,
}

impl Position {
    pub fn new(begin: usize, decl: usize, end: usize) -> Self {
        Self {
            begin,
            decl,
            end,
            entries_begin: None,
            entries_end: None,
        }
    }

    pub fn with_entries(mut self, begin: usize, end: usize) -> Self {
        self.entries_begin = Some(begin);
        self.entries_end = Some(end);
        self
    }
}

/// A library version marker such as `SDL 3.2.0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag {
    pub tag: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionTag {
    pub fn new(tag: &str, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            tag: tag.to_string(),
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string for the given tag
    pub fn parse(tag: &str, version: &str) -> Option<Self> {
        let mut parts = version.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(tag, major, minor, patch))
    }

    /// True when this version is strictly newer than `other` (tags ignored)
    pub fn is_newer_than(&self, other: &VersionTag) -> bool {
        (self.major, self.minor, self.patch) > (other.major, other.minor, other.patch)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.tag, self.major, self.minor, self.patch)
    }
}

/// Side-channel payloads for the emitter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hints {
    /// Literal body text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Member initializers for constructors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub init: Vec<String>,
    /// Function the body forwards its arguments to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
    /// Expression passed as first argument when delegating from a member
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_: Option<String>,
    /// Drop the first parameter when relocated as a member
    #[serde(skip_serializing_if = "is_false")]
    pub remove_param_this: bool,
    /// Failure is reported by raising instead of a sentinel return
    #[serde(skip_serializing_if = "is_false")]
    pub may_fail: bool,
    /// Emit as `= default`
    #[serde(skip_serializing_if = "is_false")]
    pub defaulted: bool,
    /// Hints copied onto the free-function stubs of this owner's members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<Box<Hints>>,
}

impl Hints {
    pub fn is_empty(&self) -> bool {
        *self == Hints::default()
    }

    /// Fill unset fields from `other`; flags are or-ed, initializers appended
    pub fn merge_from(&mut self, other: &Hints) {
        if self.body.is_none() {
            self.body = other.body.clone();
        }
        if self.delegate.is_none() {
            self.delegate = other.delegate.clone();
        }
        if self.self_.is_none() {
            self.self_ = other.self_.clone();
        }
        self.init.extend(other.init.iter().cloned());
        self.remove_param_this |= other.remove_param_this;
        self.may_fail |= other.may_fail;
        self.defaulted |= other.defaulted;
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

/// One API element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    #[serde(flatten)]
    pub kind: DeclKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<Parameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub constexpr: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub immutable: bool,
    #[serde(rename = "static", default, skip_serializing_if = "is_false")]
    pub static_: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub explicit: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reference: u8,
    /// Prototype only; the body is supplied during hierarchy resolution
    #[serde(default, skip_serializing_if = "is_false")]
    pub proto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<VersionTag>,
    #[serde(default, skip_serializing_if = "Hints::is_empty")]
    pub hints: Hints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Declaration {
    pub fn new(kind: DeclKind, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            doc: String::new(),
            type_: String::new(),
            parameters: Vec::new(),
            template: None,
            source_name: None,
            value: None,
            constexpr: false,
            immutable: false,
            static_: false,
            explicit: false,
            reference: 0,
            proto: false,
            since: None,
            hints: Hints::default(),
            position: None,
        }
    }

    pub fn function(name: &str, type_: &str) -> Self {
        Self::new(DeclKind::Function, name).with_type(type_)
    }

    pub fn with_type(mut self, type_: &str) -> Self {
        self.type_ = type_.to_string();
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn with_param(mut self, name: &str, type_: &str) -> Self {
        self.parameters.push(Parameter::new(name, type_));
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Add a nested entry; no-op for non-container kinds
    pub fn with_entry(mut self, decl: Declaration) -> Self {
        if let Some(entries) = self.kind.entries_mut() {
            insert_entry(entries, decl);
        }
        self
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, DeclKind::Function)
    }
}

/// A declaration or an overload group sharing one name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeclEntry {
    Overloads(Vec<Declaration>),
    Single(Declaration),
}

impl DeclEntry {
    pub fn from_vec(mut decls: Vec<Declaration>) -> Self {
        if decls.len() == 1 {
            if let Some(decl) = decls.pop() {
                return DeclEntry::Single(decl);
            }
        }
        DeclEntry::Overloads(decls)
    }

    pub fn as_slice(&self) -> &[Declaration] {
        match self {
            DeclEntry::Single(decl) => std::slice::from_ref(decl),
            DeclEntry::Overloads(decls) => decls,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Declaration] {
        match self {
            DeclEntry::Single(decl) => std::slice::from_mut(decl),
            DeclEntry::Overloads(decls) => decls,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Declaration> {
        self.as_mut_slice().iter_mut()
    }

    pub fn first(&self) -> Option<&Declaration> {
        self.as_slice().first()
    }

    pub fn into_vec(self) -> Vec<Declaration> {
        match self {
            DeclEntry::Single(decl) => vec![decl],
            DeclEntry::Overloads(decls) => decls,
        }
    }

    /// Name shared by the entry's declarations
    pub fn name(&self) -> &str {
        self.first().map_or("", |decl| decl.name.as_str())
    }

    /// Only function entries may form overload groups
    pub fn is_function(&self) -> bool {
        self.iter().all(Declaration::is_function) && self.first().is_some()
    }

    /// Append an overload, turning a single declaration into a group
    pub fn push(&mut self, decl: Declaration) {
        let mut decls = std::mem::replace(self, DeclEntry::Overloads(Vec::new())).into_vec();
        decls.push(decl);
        *self = DeclEntry::Overloads(decls);
    }
}

impl From<Declaration> for DeclEntry {
    fn from(decl: Declaration) -> Self {
        DeclEntry::Single(decl)
    }
}

/// Insert under the declaration's own name, grouping function overloads
pub fn insert_entry(set: &mut DeclarationSet, decl: Declaration) {
    match set.get_mut(&decl.name) {
        Some(existing) if existing.is_function() && decl.is_function() => existing.push(decl),
        _ => {
            set.insert(decl.name.clone(), DeclEntry::Single(decl));
        }
    }
}

/// Visit every declaration of a set, nested ones included, parents first
pub fn visit_declarations_mut(set: &mut DeclarationSet, f: &mut dyn FnMut(&mut Declaration)) {
    for entry in set.values_mut() {
        for decl in entry.iter_mut() {
            f(decl);
            if let Some(entries) = decl.kind.entries_mut() {
                visit_declarations_mut(entries, f);
            }
        }
    }
}

/// Visit every declaration of a set, nested ones included, parents first
pub fn visit_declarations(set: &DeclarationSet, f: &mut dyn FnMut(&Declaration)) {
    for entry in set.values() {
        for decl in entry.iter() {
            f(decl);
            if let Some(entries) = decl.kind.entries() {
                visit_declarations(entries, f);
            }
        }
    }
}

// =============================================================================
// MODULES
// =============================================================================

/// Line positions of a module's doc block and declaration range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_begin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_end: Option<usize>,
    pub entries_begin: usize,
    pub entries_end: usize,
    /// Line of the marker closing the module's doc group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_end: Option<usize>,
}

/// One header's content
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    #[serde(default)]
    pub entries: DeclarationSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<ModulePosition>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_entry(mut self, decl: Declaration) -> Self {
        insert_entry(&mut self.entries, decl);
        self
    }
}

/// A collection of modules keyed by path
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiModel {
    #[serde(default)]
    pub files: IndexMap<String, Module>,
}

impl ApiModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, module: Module) -> Self {
        self.files.insert(path.to_string(), module);
        self
    }
}

// =============================================================================
// LOADING
// =============================================================================

fn format_of(path: &Path) -> Result<&'static str, ModelError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok("json"),
        Some("yaml") | Some("yml") => Ok("yaml"),
        other => Err(ModelError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// Load a model file written by the parser (`.json`, `.yaml`)
pub fn load_model(path: &Path) -> Result<ApiModel, ModelError> {
    let display = path.display().to_string();
    let format = format_of(path)?;
    let content = fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: display.clone(),
        source,
    })?;
    let decoded = match format {
        "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
    };
    decoded.map_err(|message| ModelError::Decode {
        path: display,
        message,
    })
}

/// Serialize a model as pretty JSON
pub fn model_to_json(model: &ApiModel) -> Result<String, ModelError> {
    serde_json::to_string_pretty(model).map_err(|e| ModelError::Encode(e.to_string()))
}

/// Write a model file, format chosen by extension
pub fn save_model(path: &Path, model: &ApiModel) -> Result<(), ModelError> {
    let content = match format_of(path)? {
        "json" => model_to_json(model)?,
        _ => serde_yaml::to_string(model).map_err(|e| ModelError::Encode(e.to_string()))?,
    };
    fs::write(path, content).map_err(|source| ModelError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_and_overloads() {
        let json = r#"{
            "name": "foo",
            "entries": {
                "SDL_Foo": {"kind": "struct", "name": "SDL_Foo", "entries": {
                    "x": {"kind": "variable", "name": "x", "type": "int"}
                }},
                "SDL_Open": [
                    {"kind": "function", "name": "SDL_Open", "type": "SDL_Foo *"},
                    {"kind": "function", "name": "SDL_Open", "type": "SDL_Foo *",
                     "parameters": [{"name": "flags", "type": "int"}]}
                ]
            }
        }"#;
        let module: Module = serde_json::from_str(json).unwrap();
        let foo = module.entries["SDL_Foo"].first().unwrap();
        assert!(matches!(foo.kind, DeclKind::Struct { .. }));
        assert_eq!(foo.kind.entries().unwrap().len(), 1);
        let open = &module.entries["SDL_Open"];
        assert!(matches!(open, DeclEntry::Overloads(v) if v.len() == 2));
        assert!(open.is_function());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"kind": "macro-soup", "name": "X"}"#;
        assert!(serde_json::from_str::<Declaration>(json).is_err());
    }

    #[test]
    fn test_serialize_skips_defaults() {
        let decl = Declaration::function("Open", "void");
        let value = serde_json::to_value(&decl).unwrap();
        assert_eq!(value, serde_json::json!({"name": "Open", "kind": "function", "type": "void"}));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DeclKind::ForwardDeclaration.as_str(), "forward-declaration");
        assert_eq!(DeclKind::new_struct().to_string(), "struct");
    }

    #[test]
    fn test_push_turns_single_into_group() {
        let mut entry = DeclEntry::from(Declaration::function("f", "void"));
        entry.push(Declaration::function("f", "int"));
        assert_eq!(entry.as_slice().len(), 2);
        assert_eq!(entry.name(), "f");
    }

    #[test]
    fn test_insert_entry_groups_functions_only() {
        let mut set = DeclarationSet::new();
        insert_entry(&mut set, Declaration::function("f", "void"));
        insert_entry(&mut set, Declaration::function("f", "int"));
        insert_entry(&mut set, Declaration::new(DeclKind::Variable, "v"));
        insert_entry(&mut set, Declaration::new(DeclKind::Variable, "v").with_type("int"));
        assert_eq!(set["f"].as_slice().len(), 2);
        assert_eq!(set["v"].as_slice().len(), 1);
        assert_eq!(set["v"].first().unwrap().type_, "int");
    }

    #[test]
    fn test_version_parse_and_compare() {
        let v = VersionTag::parse("SDL", "3.2.1").unwrap();
        assert_eq!(v, VersionTag::new("SDL", 3, 2, 1));
        assert!(v.is_newer_than(&VersionTag::new("SDL", 3, 2, 0)));
        assert!(!v.is_newer_than(&VersionTag::new("SDL", 3, 2, 1)));
        assert_eq!(VersionTag::parse("SDL", "3"), Some(VersionTag::new("SDL", 3, 0, 0)));
        assert!(VersionTag::parse("SDL", "3.x").is_none());
        assert!(VersionTag::parse("SDL", "1.2.3.4").is_none());
    }

    #[test]
    fn test_visit_nested() {
        let mut set = DeclarationSet::new();
        insert_entry(
            &mut set,
            Declaration::new(DeclKind::new_struct(), "S")
                .with_entry(Declaration::new(DeclKind::Variable, "x")),
        );
        let mut names = Vec::new();
        visit_declarations(&set, &mut |decl| names.push(decl.name.clone()));
        assert_eq!(names, vec!["S", "x"]);
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = ApiModel::new().with_file(
            "foo.h",
            Module::new("foo").with_entry(Declaration::function("Open", "void")),
        );
        save_model(&path, &model).unwrap();
        assert_eq!(load_model(&path).unwrap(), model);
        assert!(matches!(
            load_model(&dir.path().join("model.txt")),
            Err(ModelError::UnsupportedFormat(_))
        ));
    }
}
