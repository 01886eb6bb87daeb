//! Value wrappers
//!
//! A wrapped value type becomes a thin struct holding the original value, or
//! inheriting it when the source is already a struct.

use super::replace_at;
use crate::config::{FileSpec, WrapperSpec};
use crate::context::TransformContext;
use crate::model::{DeclKind, Declaration, DeclarationSet, Parameter};
use tracing::warn;

pub fn expand_wrappers(entries: &mut DeclarationSet, file: &FileSpec, ctx: &mut TransformContext) {
    for (source, spec) in &file.wrappers {
        expand_wrapper(entries, source, spec, ctx);
    }
}

fn expand_wrapper(entries: &mut DeclarationSet, source: &str, spec: &WrapperSpec, ctx: &mut TransformContext) {
    let Some(index) = entries.get_index_of(source) else {
        warn!(wrapper = source, "wrapped type not found, leaving it untouched");
        return;
    };
    let Some(original) = entries[index].first().cloned() else {
        return;
    };
    let name = spec.name.clone().unwrap_or_else(|| ctx.make_name(source));

    let wrapper = match &original.kind {
        DeclKind::Struct { entries: fields } => struct_wrapper(&name, source, fields, spec),
        DeclKind::Alias | DeclKind::ForwardDeclaration | DeclKind::Enum { .. } => value_wrapper(&name, source, spec),
        other => {
            warn!(wrapper = source, kind = %other, "unsupported wrapped kind, leaving it untouched");
            return;
        }
    };
    let mut wrapper = wrapper.with_doc(&original.doc);
    wrapper.source_name = Some(source.to_string());
    wrapper.since = original.since.clone();

    replace_at(entries, index, name.clone(), wrapper.into());
    ctx.mark_synthetic(&name);
    ctx.map_name(source, &name);
    ctx.map_param_type(source, &name);
    ctx.map_return_type(source, &name);
    if matches!(original.kind, DeclKind::Struct { .. }) {
        ctx.map_param_type(&format!("const {source} *"), &format!("const {name} &"));
    }
}

fn comparison_operators(mut decl: Declaration, name: &str, spec: &WrapperSpec) -> Declaration {
    if spec.comparable {
        let mut eq = Declaration::function("operator==", "bool")
            .with_param("other", &format!("const {name} &"));
        eq.immutable = true;
        eq.constexpr = true;
        eq.hints.defaulted = true;
        decl = decl.with_entry(eq);
    }
    if spec.ordered {
        let mut cmp = Declaration::function("operator<=>", "auto")
            .with_param("other", &format!("const {name} &"));
        cmp.immutable = true;
        cmp.constexpr = true;
        cmp.hints.defaulted = true;
        decl = decl.with_entry(cmp);
    }
    decl
}

fn validity_check(invalid: &str, field: &str) -> Declaration {
    let mut check = Declaration::function("operator bool", "");
    check.explicit = true;
    check.constexpr = true;
    check.immutable = true;
    check.hints.body = Some(format!("return {field} != {invalid};"));
    check
}

fn value_wrapper(name: &str, source: &str, spec: &WrapperSpec) -> Declaration {
    let invalid = spec.invalid_value.as_deref().unwrap_or("0");

    let held = Declaration::new(DeclKind::Variable, "m_value").with_type(source);

    let mut ctor = Declaration::new(DeclKind::Function, name);
    ctor.parameters = vec![Parameter::new("value", source).with_default(invalid)];
    ctor.constexpr = true;
    ctor.hints.init = vec!["m_value(value)".to_string()];
    ctor.hints.body = Some(String::new());

    let mut decl = Declaration::new(DeclKind::new_struct(), name)
        .with_entry(held)
        .with_entry(ctor);
    decl = comparison_operators(decl, name, spec);

    if spec.unwrap {
        let mut unwrap = Declaration::function(&format!("operator {source}"), "");
        unwrap.constexpr = true;
        unwrap.immutable = true;
        unwrap.hints.body = Some("return m_value;".to_string());
        decl = decl.with_entry(unwrap);
    }
    decl.with_entry(validity_check(invalid, "m_value"))
}

fn struct_wrapper(name: &str, source: &str, fields: &DeclarationSet, spec: &WrapperSpec) -> Declaration {
    let mut ctor = Declaration::new(DeclKind::Function, name);
    ctor.parameters = vec![Parameter::new("value", &format!("const {source} &")).with_default("{}")];
    ctor.constexpr = true;
    ctor.hints.init = vec![format!("{source}(value)")];
    ctor.hints.body = Some(String::new());

    let mut decl = Declaration::new(DeclKind::new_struct(), name)
        .with_type(source)
        .with_entry(ctor);
    decl = comparison_operators(decl, name, spec);

    if let Some(invalid) = &spec.invalid_value {
        let field = fields.keys().next().map_or("*this", String::as_str);
        decl = decl.with_entry(validity_check(invalid, field));
    }

    if spec.reflect {
        for (field, entry) in fields {
            let Some(var) = entry.first().filter(|d| matches!(d.kind, DeclKind::Variable)) else {
                continue;
            };
            let accessor = capitalize(field);

            let mut getter = Declaration::function(&format!("Get{accessor}"), &var.type_);
            getter.constexpr = true;
            getter.immutable = true;
            getter.hints.body = Some(format!("return {field};"));

            let mut setter = Declaration::function(&format!("Set{accessor}"), &format!("{name} &"))
                .with_param("newValue", &var.type_);
            setter.constexpr = true;
            setter.hints.body = Some(format!("{field} = newValue;\nreturn *this;"));

            decl = decl.with_entry(getter).with_entry(setter);
        }
    }
    decl
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
