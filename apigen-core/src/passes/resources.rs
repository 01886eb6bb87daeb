//! Resource expansion
//!
//! Turns an opaque handle type (`SDL_Window`, used as `SDL_Window *`) into a
//! family of cooperating structs:
//!
//! ```text
//! WindowRaw            alias of the raw pointer
//! WindowBase           holds the pointer, owns no lifetime
//! Window : WindowBase  owning handle, frees through reset()
//! WindowRef : Window   non-owning reference
//! WindowLock           scoped lock (optional)
//! ```
//!
//! Functions operating on the pointer are renamed into `Window.<Member>`
//! paths so hierarchy resolution relocates them into the owning handle.

use super::{insert_after, replace_at};
use crate::config::{FileSpec, HandlePolicy, ResourceSpec};
use crate::context::{normalize_type, TransformContext};
use crate::model::{DeclEntry, DeclKind, Declaration, DeclarationSet, Parameter};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

static FREE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Destroy|Close|Free|Release|Delete)|(?:Destroy|Close|Free|Release|Delete)$").unwrap()
});

pub fn expand_resources(entries: &mut DeclarationSet, file: &FileSpec, ctx: &mut TransformContext) {
    for (source, spec) in &file.resources {
        expand_resource(entries, source, spec, ctx);
    }
}

/// Names derived for one resource
struct ResourceNames {
    source: String,
    short: String,
    name: String,
    pointer: String,
    const_pointer: String,
}

impl ResourceNames {
    fn raw(&self) -> String {
        format!("{}Raw", self.name)
    }
    fn base(&self) -> String {
        format!("{}Base", self.name)
    }
    fn reference(&self) -> String {
        format!("{}Ref", self.name)
    }
    fn lock(&self) -> String {
        format!("{}Lock", self.name)
    }

    fn handle(&self, policy: HandlePolicy) -> Option<String> {
        match policy {
            HandlePolicy::None => None,
            HandlePolicy::Ref => Some(self.reference()),
            HandlePolicy::Unique => Some(self.name.clone()),
        }
    }
}

fn expand_resource(entries: &mut DeclarationSet, source: &str, spec: &ResourceSpec, ctx: &mut TransformContext) {
    let Some(anchor) = entries.get_index_of(source) else {
        warn!(resource = source, "resource type not found, leaving it untouched");
        return;
    };
    let short = ctx.strip_prefix(source);
    let names = ResourceNames {
        source: source.to_string(),
        name: spec.name.clone().unwrap_or_else(|| ctx.make_name(source)),
        pointer: normalize_type(&format!("{source} *")),
        const_pointer: normalize_type(&format!("const {source} *")),
        short,
    };

    let free = match spec.free.clone().or_else(|| find_free_function(entries, &names)) {
        Some(free) => free,
        None => {
            warn!(resource = source, "no free function found, leaving resource untouched");
            return;
        }
    };

    let synthesized = [names.raw(), names.base(), names.name.clone(), names.reference(), names.lock()];
    if let Some(clash) = synthesized.iter().find(|key| *key != source && entries.contains_key(*key)) {
        warn!(resource = source, name = %clash, "generated name already declared, leaving resource untouched");
        return;
    }

    // Members are collected before the anchor is replaced
    let members = collect_members(entries, &names, spec, &free, ctx);

    let mut raw = Declaration::new(DeclKind::Alias, &names.raw())
        .with_type(&names.pointer)
        .with_doc(&format!("Raw pointer of {}.", names.name));
    raw.source_name = Some(source.to_string());
    let raw_key = names.raw();
    replace_at(entries, anchor, raw_key.clone(), raw.into());
    ctx.mark_synthetic(&raw_key);
    ctx.map_name(source, &names.name);

    let mut previous = raw_key;
    let mut family = vec![base_struct(&names), owning_struct(&names, &free), ref_struct(&names)];
    if let Some(lock) = &spec.lock {
        family.push(lock_struct(&names, &lock.lock, &lock.unlock));
    }
    for decl in family {
        let key = decl.name.clone();
        debug!(resource = source, declaration = %key, "synthesized resource declaration");
        insert_after(entries, &previous, key.clone(), decl.into());
        ctx.mark_synthetic(&key);
        previous = key;
    }

    if let Some(handle) = names.handle(spec.param_policy) {
        ctx.map_param_type(&names.pointer, &handle);
        ctx.map_param_type(&names.const_pointer, &format!("const {handle} &"));
    }
    if let Some(handle) = names.handle(spec.return_policy) {
        ctx.map_return_type(&names.pointer, &handle);
    }

    for (member_source, delta) in members {
        ctx.add_delta(&member_source, delta);
    }
}

/// Single-parameter function on the pointer whose name carries a free-like token
fn find_free_function(entries: &DeclarationSet, names: &ResourceNames) -> Option<String> {
    entries.iter().find_map(|(key, entry)| {
        let DeclEntry::Single(decl) = entry else {
            return None;
        };
        if !decl.is_function() || decl.parameters.len() != 1 {
            return None;
        }
        if normalize_type(&decl.parameters[0].type_) != names.pointer {
            return None;
        }
        let remainder = key.replacen(&names.short, "", 1);
        let remainder = remainder.trim_matches('_');
        let remainder = remainder.rsplit('_').next().unwrap_or(remainder);
        FREE_TOKEN_RE.is_match(remainder).then(|| key.clone())
    })
}

/// Local member name: source name minus prefix and the resource's short name
fn member_name(key: &str, names: &ResourceNames, ctx: &TransformContext) -> Option<String> {
    let stripped = ctx.strip_prefix(key);
    let local = stripped.replacen(&names.short, "", 1);
    let local = local.trim_matches('_');
    (!local.is_empty()).then(|| local.to_string())
}

/// Deltas relocating the resource's functions into the owning handle
fn collect_members(
    entries: &DeclarationSet,
    names: &ResourceNames,
    spec: &ResourceSpec,
    free: &str,
    ctx: &TransformContext,
) -> Vec<(String, serde_json::Value)> {
    let mut members = Vec::new();

    for (key, entry) in entries {
        let Some(decl) = entry.first() else {
            continue;
        };
        if !decl.is_function() || ctx.is_blacklisted(key) {
            continue;
        }

        if let Some(target) = spec.entries.get(key) {
            let path = if target.contains('.') || target.contains("::") {
                target.clone()
            } else {
                format!("{}.{}", names.name, target)
            };
            members.push((key.clone(), json!({"name": path, "proto": true, "hints": {"self": "get()"}})));
            continue;
        }

        if !key.contains(&names.short) {
            continue;
        }
        let first_param = decl.parameters.first().map(|p| normalize_type(&p.type_));
        let takes_self = first_param
            .as_deref()
            .is_some_and(|t| t == names.pointer || t == names.const_pointer);
        let returns_self = normalize_type(&decl.type_) == names.pointer;
        let Some(local) = member_name(key, names, ctx) else {
            continue;
        };

        if key == free {
            members.push((
                key.clone(),
                json!({"name": format!("{}.{}", names.name, local), "hints": {"body": "reset();"}}),
            ));
        } else if takes_self {
            members.push((
                key.clone(),
                json!({"name": format!("{}.{}", names.name, local), "proto": true, "hints": {"self": "get()"}}),
            ));
        } else if returns_self {
            // Constructors keep their free-function form next to the member
            members.push((
                key.clone(),
                json!({"name": format!("{}::{}", names.name, names.name), "proto": true}),
            ));
        }
    }

    members
}

fn constructor(name: &str, params: Vec<Parameter>, init: &[String]) -> Declaration {
    let mut decl = Declaration::new(DeclKind::Function, name);
    decl.parameters = params;
    decl.hints.init = init.to_vec();
    decl.hints.body = Some(String::new());
    decl
}

fn method(name: &str, type_: &str, params: Vec<Parameter>, body: &str) -> Declaration {
    let mut decl = Declaration::function(name, type_);
    decl.parameters = params;
    decl.hints.body = Some(body.to_string());
    decl
}

fn base_struct(names: &ResourceNames) -> Declaration {
    let base = names.base();
    let mut ctor = constructor(
        &base,
        vec![Parameter::new("resource", &names.raw()).with_default("{}")],
        &["Resource(resource)".to_string()],
    );
    ctor.constexpr = true;
    ctor.explicit = true;

    let mut decl = Declaration::new(DeclKind::new_struct(), &base)
        .with_type(&format!("Resource<{}>", names.raw()))
        .with_doc(&format!("Base of {} handles, owning no lifetime.", names.name))
        .with_entry(ctor);
    decl.source_name = Some(names.source.clone());
    decl
}

fn owning_struct(names: &ResourceNames, free: &str) -> Declaration {
    let name = &names.name;
    let raw = names.raw();

    let mut from_raw = constructor(
        name,
        vec![Parameter::new("resource", &raw).with_default("{}")],
        &[format!("{}(resource)", names.base())],
    );
    from_raw.constexpr = true;
    from_raw.explicit = true;
    let from_other = constructor(
        name,
        vec![Parameter::new("other", &format!("{name} &&"))],
        &[format!("{}(other.release())", names.base())],
    );
    let destructor = method(&format!("~{name}"), "", Vec::new(), "reset();");
    let assign = method(
        "operator=",
        &format!("{name} &"),
        vec![Parameter::new("other", name)],
        "reset(other.release());\nreturn *this;",
    );
    let reset = method(
        "reset",
        "void",
        vec![Parameter::new("newResource", &raw).with_default("{}")],
        &format!("{free}(release(newResource));"),
    );

    let mut decl = Declaration::new(DeclKind::new_struct(), name)
        .with_type(&names.base())
        .with_doc(&format!("Owning handle to {}.", names.source))
        .with_entry(from_raw)
        .with_entry(from_other)
        .with_entry(destructor)
        .with_entry(assign)
        .with_entry(reset);
    decl.source_name = Some(names.source.clone());
    decl
}

fn ref_struct(names: &ResourceNames) -> Declaration {
    let name = &names.name;
    let reference = names.reference();
    let from_raw = constructor(
        &reference,
        vec![Parameter::new("resource", &names.raw())],
        &[format!("{name}(resource)")],
    );
    let copy = constructor(
        &reference,
        vec![Parameter::new("other", &format!("const {reference} &"))],
        &[format!("{name}(other.get())")],
    );
    let destructor = method(&format!("~{reference}"), "", Vec::new(), "release();");

    let mut decl = Declaration::new(DeclKind::new_struct(), &reference)
        .with_type(name)
        .with_doc(&format!("Non-owning reference to {name}."))
        .with_entry(from_raw)
        .with_entry(copy)
        .with_entry(destructor);
    decl.source_name = Some(names.source.clone());
    decl
}

fn lock_struct(names: &ResourceNames, lock: &str, unlock: &str) -> Declaration {
    let lock_name = names.lock();
    let reference = names.reference();

    let held = Declaration::new(DeclKind::Variable, "m_lock").with_type(&reference);
    let mut acquire = constructor(
        &lock_name,
        vec![Parameter::new("resource", &reference)],
        &["m_lock(std::move(resource))".to_string()],
    );
    acquire.explicit = true;
    acquire.hints.body = Some(format!("{lock}(m_lock.get());"));
    let destructor = method(&format!("~{lock_name}"), "", Vec::new(), "reset();");
    let reset = method(
        "reset",
        "void",
        Vec::new(),
        &format!("if (!m_lock) return;\n{unlock}(m_lock.get());\nm_lock = {{}};"),
    );

    let mut decl = Declaration::new(DeclKind::new_struct(), &lock_name)
        .with_doc(&format!("Scoped lock on {}.", names.name))
        .with_entry(held)
        .with_entry(acquire)
        .with_entry(destructor)
        .with_entry(reset);
    decl.source_name = Some(names.source.clone());
    decl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockSpec, TransformSpec};
    use crate::model::insert_entry;

    fn source() -> DeclarationSet {
        let mut set = DeclarationSet::new();
        insert_entry(&mut set, Declaration::new(DeclKind::ForwardDeclaration, "SDL_Window"));
        insert_entry(
            &mut set,
            Declaration::function("SDL_CreateWindow", "SDL_Window *").with_param("title", "const char *"),
        );
        insert_entry(
            &mut set,
            Declaration::function("SDL_GetWindowTitle", "const char *").with_param("window", "const SDL_Window *"),
        );
        insert_entry(
            &mut set,
            Declaration::function("SDL_DestroyWindow", "void").with_param("window", "SDL_Window *"),
        );
        insert_entry(
            &mut set,
            Declaration::function("SDL_RaiseWindow", "bool").with_param("window", "SDL_Window*"),
        );
        set
    }

    fn context() -> TransformContext {
        TransformContext::new(&TransformSpec {
            prefixes: vec!["SDL_".into()],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_find_free_function() {
        let set = source();
        let names = ResourceNames {
            source: "SDL_Window".into(),
            short: "Window".into(),
            name: "Window".into(),
            pointer: "SDL_Window *".into(),
            const_pointer: "const SDL_Window *".into(),
        };
        assert_eq!(find_free_function(&set, &names).as_deref(), Some("SDL_DestroyWindow"));
    }

    #[test]
    fn test_expand_resource_family() {
        let mut set = source();
        let mut ctx = context();
        let file = FileSpec {
            resources: [("SDL_Window".to_string(), ResourceSpec::default())].into_iter().collect(),
            ..Default::default()
        };
        expand_resources(&mut set, &file, &mut ctx);

        let keys: Vec<&str> = set.keys().map(String::as_str).take(4).collect();
        assert_eq!(keys, vec!["WindowRaw", "WindowBase", "Window", "WindowRef"]);
        assert!(!set.contains_key("SDL_Window"));
        assert!(ctx.is_synthetic("Window"));
        assert_eq!(ctx.name_map["SDL_Window"], "Window");

        let owning = set["Window"].first().unwrap();
        let reset = owning.kind.entries().unwrap()["reset"].first().unwrap();
        assert_eq!(reset.hints.body.as_deref(), Some("SDL_DestroyWindow(release(newResource));"));

        assert_eq!(ctx.param_type("SDL_Window *"), "WindowRef");
        assert_eq!(ctx.param_type("const SDL_Window *"), "const WindowRef &");
        assert_eq!(ctx.return_type("SDL_Window*"), "Window");

        assert_eq!(ctx.generated_delta("SDL_RaiseWindow").unwrap()["name"], "Window.Raise");
        assert_eq!(ctx.generated_delta("SDL_GetWindowTitle").unwrap()["name"], "Window.GetTitle");
        assert_eq!(ctx.generated_delta("SDL_DestroyWindow").unwrap()["name"], "Window.Destroy");
        assert_eq!(ctx.generated_delta("SDL_CreateWindow").unwrap()["name"], "Window::Window");
    }

    #[test]
    fn test_lock_follows_reference() {
        let mut set = source();
        let mut ctx = context();
        let spec = ResourceSpec {
            lock: Some(LockSpec {
                lock: "SDL_LockWindow".into(),
                unlock: "SDL_UnlockWindow".into(),
            }),
            ..Default::default()
        };
        let file = FileSpec {
            resources: [("SDL_Window".to_string(), spec)].into_iter().collect(),
            ..Default::default()
        };
        expand_resources(&mut set, &file, &mut ctx);
        assert!(set.contains_key("WindowLock"));
        assert_eq!(set.get_index_of("WindowLock"), Some(4));
    }

    #[test]
    fn test_missing_free_function_degrades() {
        let mut set = source();
        set.shift_remove("SDL_DestroyWindow");
        let mut ctx = context();
        let file = FileSpec {
            resources: [("SDL_Window".to_string(), ResourceSpec::default())].into_iter().collect(),
            ..Default::default()
        };
        expand_resources(&mut set, &file, &mut ctx);
        assert!(set.contains_key("SDL_Window"));
        assert!(!set.contains_key("Window"));
        assert!(ctx.generated_delta("SDL_RaiseWindow").is_none());
    }
}
