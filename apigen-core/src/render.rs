//! Text rendering of target declarations
//!
//! The patch engine only needs whole entries, doc blocks and the module
//! doc group markers; [`HeaderRenderer`] writes them as C++ header text.

use crate::model::{
    DeclEntry, DeclKind, Declaration, DeclarationSet, Module, ModulePosition, Parameter, Position, VersionTag,
};

/// Turns declarations into source text. Every returned string ends with a newline.
pub trait Renderer {
    /// Declaration without its doc comment
    fn render_declaration(&self, decl: &Declaration, depth: usize) -> String;

    /// Doc comment block; empty for an empty doc
    fn render_doc(&self, doc: &str, depth: usize) -> String;

    /// Module doc block opening the module's doc group
    fn render_module_doc(&self, module: &Module) -> String;

    /// Marker closing the module's doc group
    fn render_group_end(&self) -> String;

    /// Record the positions `decl` and its members take when rendered
    /// starting at `line`; returns the line following the entry
    fn locate_entry(&self, decl: &mut Declaration, depth: usize, line: usize) -> usize;

    /// Doc, declaration and a separating blank line
    fn render_entry(&self, decl: &Declaration, depth: usize) -> String {
        let mut out = self.render_doc(&decl.doc, depth);
        out.push_str(&self.render_declaration(decl, depth));
        out.push('\n');
        out
    }

    fn render_module(&self, module: &Module) -> String {
        let grouped = !module.doc.is_empty();
        let mut out = String::new();
        if grouped {
            out.push_str(&self.render_module_doc(module));
            out.push('\n');
        }
        for entry in module.entries.values() {
            for decl in entry.iter() {
                out.push_str(&self.render_entry(decl, 0));
            }
        }
        if grouped {
            out.push_str(&self.render_group_end());
        }
        out
    }

    /// Render a module and return a copy of it carrying the line positions
    /// of the rendered text, ready to be patched by a later run.
    fn render_positioned(&self, module: &Module) -> (String, Module) {
        let mut located = module.clone();
        let mut line = 1;
        let mut position = ModulePosition::default();
        let grouped = !module.doc.is_empty();

        if grouped {
            position.doc_begin = Some(line);
            line += line_count(&self.render_module_doc(module));
            position.doc_end = Some(line);
            line += 1;
        }
        position.entries_begin = line;
        for decl in located.entries.values_mut().flat_map(DeclEntry::iter_mut) {
            line = self.locate_entry(decl, 0, line);
        }
        position.entries_end = line;
        if grouped {
            position.group_end = Some(line);
        }
        located.position = Some(position);

        (self.render_module(module), located)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderRenderer {
    pub indent_width: usize,
}

impl Default for HeaderRenderer {
    fn default() -> Self {
        Self { indent_width: 2 }
    }
}

fn version_macro(version: &VersionTag) -> String {
    format!(
        "{}_VERSION_ATLEAST({}, {}, {})",
        version.tag, version.major, version.minor, version.patch
    )
}

/// `const char *` + `name` → `const char *name`, `int` + `x` → `int x`
fn typed_name(type_: &str, name: &str) -> String {
    if type_.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        type_.to_string()
    } else if type_.ends_with('*') || type_.ends_with('&') {
        format!("{type_}{name}")
    } else {
        format!("{type_} {name}")
    }
}

fn parameter_list(params: &[Parameter]) -> String {
    params
        .iter()
        .map(|param| match &param.default {
            Some(default) => format!("{} = {}", typed_name(&param.type_, &param.name), default),
            None => typed_name(&param.type_, &param.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl HeaderRenderer {
    fn pad(&self, depth: usize) -> String {
        " ".repeat(depth * self.indent_width)
    }

    fn render_members(&self, decl: &Declaration, depth: usize, out: &mut String) {
        let Some(entries) = decl.kind.entries() else {
            return;
        };
        for entry in entries.values() {
            for member in entry.iter() {
                out.push_str(&self.render_entry(member, depth));
            }
        }
    }

    fn render_enumerators(&self, decl: &Declaration, depth: usize, out: &mut String) {
        let Some(entries) = decl.kind.entries() else {
            return;
        };
        let pad = self.pad(depth);
        for member in entries.values().flat_map(|entry| entry.iter()) {
            out.push_str(&self.render_doc(&member.doc, depth));
            match &member.value {
                Some(value) => out.push_str(&format!("{pad}{} = {},\n", member.name, value)),
                None => out.push_str(&format!("{pad}{},\n", member.name)),
            }
        }
    }

    fn render_function(&self, decl: &Declaration, depth: usize) -> String {
        let pad = self.pad(depth);
        let inner = self.pad(depth + 1);

        let mut signature = String::new();
        if decl.static_ {
            signature.push_str("static ");
        }
        if decl.constexpr {
            signature.push_str("constexpr ");
        }
        if decl.explicit {
            signature.push_str("explicit ");
        }
        signature.push_str(&typed_name(&decl.type_, &decl.name));
        signature.push_str(&format!("({})", parameter_list(&decl.parameters)));
        if decl.immutable {
            signature.push_str(" const");
        }

        let hints = &decl.hints;
        if hints.defaulted {
            return format!("{pad}{signature} = default;\n");
        }

        let body = match (&hints.body, &hints.delegate) {
            (Some(body), _) => body.clone(),
            (None, Some(delegate)) => {
                let args = hints
                    .self_
                    .iter()
                    .cloned()
                    .chain(decl.parameters.iter().map(|p| p.name.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                if decl.type_.is_empty() || decl.type_ == "void" {
                    format!("{delegate}({args});")
                } else {
                    format!("return {delegate}({args});")
                }
            }
            (None, None) => return format!("{pad}{signature};\n"),
        };

        let mut out = format!("{pad}{signature}\n");
        if !hints.init.is_empty() {
            out.push_str(&format!("{pad}  : {}\n", hints.init.join(", ")));
        }
        if body.is_empty() {
            out.push_str(&format!("{pad}{{}}\n"));
        } else {
            out.push_str(&format!("{pad}{{\n"));
            for line in body.lines() {
                out.push_str(&format!("{inner}{line}\n"));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        out
    }

    fn render_body(&self, decl: &Declaration, depth: usize) -> String {
        let pad = self.pad(depth);
        let mut out = String::new();
        if let Some(template) = &decl.template {
            out.push_str(&format!("{pad}template<{}>\n", parameter_list(template)));
        }

        match &decl.kind {
            DeclKind::Alias => out.push_str(&format!("{pad}using {} = {};\n", decl.name, decl.type_)),
            DeclKind::Callback => {
                let ret = if decl.type_.is_empty() { "void" } else { decl.type_.as_str() };
                out.push_str(&format!(
                    "{pad}using {} = {} (*)({});\n",
                    decl.name,
                    ret,
                    parameter_list(&decl.parameters)
                ));
            }
            DeclKind::Definition => {
                let params = if decl.parameters.is_empty() {
                    String::new()
                } else {
                    format!("({})", parameter_list(&decl.parameters))
                };
                match &decl.value {
                    Some(value) if !value.is_empty() => {
                        out.push_str(&format!("#define {}{} {}\n", decl.name, params, value))
                    }
                    _ => out.push_str(&format!("#define {}{}\n", decl.name, params)),
                }
            }
            DeclKind::ForwardDeclaration => out.push_str(&format!("{pad}struct {};\n", decl.name)),
            DeclKind::Function => out.push_str(&self.render_function(decl, depth)),
            DeclKind::Variable => {
                let mut line = pad.clone();
                if decl.static_ {
                    line.push_str("static ");
                }
                if decl.constexpr {
                    line.push_str("constexpr ");
                }
                line.push_str(&typed_name(&decl.type_, &decl.name));
                if let Some(value) = &decl.value {
                    line.push_str(&format!(" = {value}"));
                }
                out.push_str(&line);
                out.push_str(";\n");
            }
            DeclKind::Enum { .. } => {
                out.push_str(&format!("{pad}enum {}\n{pad}{{\n", decl.name));
                self.render_enumerators(decl, depth + 1, &mut out);
                out.push_str(&format!("{pad}}};\n"));
            }
            DeclKind::Struct { .. } | DeclKind::Union { .. } => {
                let keyword = if matches!(decl.kind, DeclKind::Union { .. }) { "union" } else { "struct" };
                if decl.type_.is_empty() {
                    out.push_str(&format!("{pad}{keyword} {}\n{pad}{{\n", decl.name));
                } else {
                    out.push_str(&format!("{pad}{keyword} {} : {}\n{pad}{{\n", decl.name, decl.type_));
                }
                self.render_members(decl, depth + 1, &mut out);
                out.push_str(&format!("{pad}}};\n"));
            }
            DeclKind::Namespace { .. } => {
                out.push_str(&format!("{pad}namespace {} {{\n\n", decl.name));
                self.render_members(decl, depth, &mut out);
                out.push_str(&format!("{pad}}} // namespace {}\n", decl.name));
            }
        }
        out
    }
}

pub(crate) fn line_count(text: &str) -> usize {
    text.matches('\n').count()
}

impl Renderer for HeaderRenderer {
    fn render_declaration(&self, decl: &Declaration, depth: usize) -> String {
        let body = self.render_body(decl, depth);
        match &decl.since {
            Some(version) => {
                let guard = version_macro(version);
                format!("#if {guard}\n\n{body}\n#endif // {guard}\n")
            }
            None => body,
        }
    }

    fn render_doc(&self, doc: &str, depth: usize) -> String {
        if doc.trim().is_empty() {
            return String::new();
        }
        let pad = self.pad(depth);
        let mut out = format!("{pad}/**\n");
        for line in doc.trim_end().lines() {
            if line.is_empty() {
                out.push_str(&format!("{pad} *\n"));
            } else {
                out.push_str(&format!("{pad} * {line}\n"));
            }
        }
        out.push_str(&format!("{pad} */\n"));
        out
    }

    fn render_module_doc(&self, module: &Module) -> String {
        let mut lines = module.doc.trim().lines();
        let title = lines.next().unwrap_or_default();
        let mut out = format!("/**\n * @defgroup Category{} {}\n", capitalize(&module.name), title);
        for line in lines {
            if line.is_empty() {
                out.push_str(" *\n");
            } else {
                out.push_str(&format!(" * {line}\n"));
            }
        }
        out.push_str(" *\n * @{\n */\n");
        out
    }

    fn render_group_end(&self) -> String {
        "/// @}\n".to_string()
    }

    fn locate_entry(&self, decl: &mut Declaration, depth: usize, line: usize) -> usize {
        let begin = line;
        let decl_line = begin + line_count(&self.render_doc(&decl.doc, depth));
        let mut body = decl_line;
        if decl.since.is_some() {
            body += 2;
        }
        if decl.template.is_some() {
            body += 1;
        }
        let end = begin + line_count(&self.render_entry(decl, depth));
        let mut position = Position::new(begin, decl_line, end);

        // Every container opens with two lines: the header and `{` or a blank line
        let entries_begin = body + 2;
        let mut cursor = entries_begin;
        match &mut decl.kind {
            DeclKind::Struct { entries } | DeclKind::Union { entries } => {
                cursor = self.locate_set(entries, depth + 1, cursor);
                position = position.with_entries(entries_begin, cursor);
            }
            DeclKind::Namespace { entries } => {
                cursor = self.locate_set(entries, depth, cursor);
                position = position.with_entries(entries_begin, cursor);
            }
            DeclKind::Enum { entries } => {
                for member in entries.values_mut().flat_map(DeclEntry::iter_mut) {
                    let member_begin = cursor;
                    let member_decl = member_begin + line_count(&self.render_doc(&member.doc, depth + 1));
                    cursor = member_decl + 1;
                    member.position = Some(Position::new(member_begin, member_decl, cursor));
                }
                position = position.with_entries(entries_begin, cursor);
            }
            _ => {}
        }

        decl.position = Some(position);
        end
    }
}

impl HeaderRenderer {
    fn locate_set(&self, entries: &mut DeclarationSet, depth: usize, mut line: usize) -> usize {
        for decl in entries.values_mut().flat_map(DeclEntry::iter_mut) {
            line = self.locate_entry(decl, depth, line);
        }
        line
    }
}
