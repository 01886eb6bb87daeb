//! Callback companions
//!
//! A C callback taking a trailing `void *userdata` gets a companion alias to
//! `std::function` without that parameter; state is captured by the closure.

use super::insert_after;
use crate::context::{normalize_type, TransformContext};
use crate::model::{DeclKind, Declaration, DeclarationSet};
use tracing::debug;

/// `WindowCallback` → `WindowCB`, anything else gets `CB` appended
fn companion_name(name: &str) -> String {
    match name.strip_suffix("Callback") {
        Some(stem) if !stem.is_empty() => format!("{stem}CB"),
        _ => format!("{name}CB"),
    }
}

fn has_userdata(decl: &Declaration) -> bool {
    decl.parameters.last().is_some_and(|param| {
        normalize_type(&param.type_) == "void *" && param.name.to_ascii_lowercase().contains("userdata")
    })
}

pub fn expand_callbacks(entries: &mut DeclarationSet, ctx: &mut TransformContext) {
    let candidates: Vec<(String, Declaration)> = entries
        .iter()
        .filter(|(key, _)| !ctx.is_blacklisted(key) && !ctx.is_synthetic(key))
        .filter_map(|(key, entry)| entry.first().map(|decl| (key.clone(), decl.clone())))
        .filter(|(_, decl)| matches!(decl.kind, DeclKind::Callback) && has_userdata(decl))
        .collect();

    for (key, original) in candidates {
        let name = companion_name(&ctx.make_name(&key));
        if entries.contains_key(&name) {
            debug!(callback = %key, companion = %name, "companion already declared");
            continue;
        }

        let params = original.parameters[..original.parameters.len() - 1]
            .iter()
            .map(|param| ctx.param_type(&param.type_))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = match ctx.return_type(&original.type_) {
            ty if ty.is_empty() => "void".to_string(),
            ty => ty,
        };

        let mut companion = Declaration::new(DeclKind::Alias, &name)
            .with_type(&format!("std::function<{ret}({params})>"))
            .with_doc(&original.doc);
        companion.since = original.since.clone();
        insert_after(entries, &key, name, companion.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformSpec;
    use crate::model::insert_entry;

    fn callback(name: &str) -> Declaration {
        Declaration::new(DeclKind::Callback, name)
            .with_type("void")
            .with_param("userdata", "void *")
            .with_param("window", "SDL_Window *")
    }

    #[test]
    fn test_companion_name() {
        assert_eq!(companion_name("HitTestCallback"), "HitTestCB");
        assert_eq!(companion_name("HitTest"), "HitTestCB");
        assert_eq!(companion_name("Callback"), "CallbackCB");
    }

    #[test]
    fn test_companion_inserted_after_original() {
        let mut set = DeclarationSet::new();
        let mut cb = Declaration::new(DeclKind::Callback, "SDL_TimerCallback")
            .with_type("Uint32")
            .with_param("timerID", "SDL_TimerID")
            .with_param("interval", "Uint32");
        cb.parameters.push(crate::model::Parameter::new("userdata", "void*"));
        insert_entry(&mut set, cb);
        insert_entry(&mut set, Declaration::function("SDL_AddTimer", "SDL_TimerID"));
        insert_entry(&mut set, callback("SDL_EventFilter"));

        let mut ctx = TransformContext::new(&TransformSpec {
            prefixes: vec!["SDL_".into()],
            ..Default::default()
        })
        .unwrap();
        ctx.map_param_type("SDL_TimerID", "TimerID");
        expand_callbacks(&mut set, &mut ctx);

        let keys: Vec<&str> = set.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["SDL_TimerCallback", "TimerCB", "SDL_AddTimer", "SDL_EventFilter"]);
        let companion = set["TimerCB"].first().unwrap();
        assert_eq!(companion.kind, DeclKind::Alias);
        assert_eq!(companion.type_, "std::function<Uint32(TimerID, Uint32)>");
    }

    #[test]
    fn test_existing_companion_is_kept() {
        let mut set = DeclarationSet::new();
        let mut cb = Declaration::new(DeclKind::Callback, "SDL_Cleanup").with_type("void");
        cb.parameters.push(crate::model::Parameter::new("userdata", "void *"));
        insert_entry(&mut set, cb);
        insert_entry(&mut set, Declaration::new(DeclKind::Alias, "CleanupCB").with_type("int"));
        let mut ctx = TransformContext::new(&TransformSpec {
            prefixes: vec!["SDL_".into()],
            ..Default::default()
        })
        .unwrap();
        expand_callbacks(&mut set, &mut ctx);
        assert_eq!(set.len(), 2);
        assert_eq!(set["CleanupCB"].first().unwrap().type_, "int");
    }
}
