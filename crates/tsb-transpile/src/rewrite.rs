//! Module syntax rewriting.
//!
//! Compiled code never contains `import` declarations. Each one becomes a
//! binding read from the module scope object, and `import()` calls are routed
//! through the loader:
//!
//! ```text
//! import Foo, { a, b as c } from './dep';   const { default: Foo, a, b: c } = __tsb_modules["/src/dep"];
//! import * as ns from './dep';              const ns = __tsb_modules["/src/dep"];
//! export { a as b } from './dep';           export { __tsb_reexport_0 as b };
//! import(name)                              __tsb_import_dynamic(name, "/src/main.ts")
//! ```
//!
//! Bindings are hoisted onto the first line and rewritten declarations are
//! blanked, so line numbers in the output match the source.
//!
//! In TypeScript sources an imported name with no value reference is dropped,
//! as the TypeScript transform would drop it. An import left with no names is
//! not a dependency at all. The JSX pragma names count as used.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, Expression, ImportDeclarationSpecifier, ImportExpression,
    ModuleDeclaration, Program,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType, Span};

use tsb_core::{CompileError, CompileOptions, DependencyReport, ModuleSpecifier};

/// Name of the scope object compiled code reads its imports from.
pub const MODULES_OBJECT: &str = "__tsb_modules";

/// Function compiled code calls for `import()`.
pub const DYNAMIC_IMPORT_FN: &str = "__tsb_import_dynamic";

/// Output of [`rewrite_module`].
#[derive(Debug)]
pub struct Rewritten {
    pub code: String,
    pub report: DependencyReport,
}

struct Edit {
    span: Span,
    replacement: String,
}

struct Rewriter<'s> {
    source: &'s str,
    location: &'s str,
    prelude: Vec<String>,
    edits: Vec<Edit>,
    report: DependencyReport,
    reexports: usize,
    elide_unused: bool,
    pragmas: Vec<&'s str>,
}

/// Rewrite `source` (fetched from `location`) and collect its dependencies.
pub fn rewrite_module(
    source: &str,
    location: &str,
    source_type: SourceType,
    options: &CompileOptions,
) -> Result<Rewritten, CompileError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if !parsed.errors.is_empty() {
        let messages: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
        return Err(CompileError::new(format!(
            "failed to parse {location}: {}",
            messages.join(", ")
        )));
    }

    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    let pragmas = if source_type.is_jsx() {
        [&options.jsx_pragma, &options.jsx_pragma_frag]
            .into_iter()
            .filter_map(|pragma| pragma.split('.').next())
            .collect()
    } else {
        Vec::new()
    };

    let mut rewriter = Rewriter {
        source,
        location,
        prelude: Vec::new(),
        edits: Vec::new(),
        report: DependencyReport::default(),
        reexports: 0,
        elide_unused: source_type.is_typescript(),
        pragmas,
    };
    rewriter.report.is_module_source = parsed
        .program
        .body
        .iter()
        .any(|stmt| stmt.as_module_declaration().is_some());
    rewriter.module_declarations(&parsed.program, semantic.scoping())?;

    let mut dynamic = DynamicImports::default();
    dynamic.visit_program(&parsed.program);
    for site in dynamic.sites {
        rewriter.dynamic_import(site)?;
    }

    Ok(rewriter.finish())
}

impl Rewriter<'_> {
    fn module_declarations(
        &mut self,
        program: &Program<'_>,
        scoping: &Scoping,
    ) -> Result<(), CompileError> {
        for stmt in &program.body {
            let Some(decl) = stmt.as_module_declaration() else {
                continue;
            };
            match decl {
                ModuleDeclaration::ImportDeclaration(import) => {
                    if import.import_kind.is_type() {
                        self.blank(import.span);
                        continue;
                    }

                    let Some(specifiers) = &import.specifiers else {
                        // import './side-effect';
                        self.static_dep(import.source.value.as_str())?;
                        self.blank(import.span);
                        continue;
                    };

                    let mut fields = Vec::new();
                    let mut namespace = None;
                    let mut value_specifiers = 0;
                    for specifier in specifiers {
                        match specifier {
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(default) => {
                                if !self.retains(scoping, &default.local) {
                                    continue;
                                }
                                value_specifiers += 1;
                                fields.push(format!("default: {}", default.local.name));
                            }
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(ns) => {
                                if !self.retains(scoping, &ns.local) {
                                    continue;
                                }
                                value_specifiers += 1;
                                namespace = Some(ns.local.name.to_string());
                            }
                            ImportDeclarationSpecifier::ImportSpecifier(named) => {
                                if named.import_kind.is_type() || !self.retains(scoping, &named.local) {
                                    continue;
                                }
                                value_specifiers += 1;
                                let imported = named.imported.name();
                                let local = named.local.name.as_str();
                                if imported.as_str() == local {
                                    fields.push(local.to_string());
                                } else {
                                    fields.push(format!("{}: {local}", property_key(&imported)));
                                }
                            }
                        }
                    }

                    // Every name was type-only or unused.
                    if value_specifiers == 0 && !specifiers.is_empty() {
                        self.blank(import.span);
                        continue;
                    }

                    let dep = self.static_dep(import.source.value.as_str())?;
                    let object = modules_entry(&dep);
                    if let Some(ns) = namespace {
                        self.prelude.push(format!("const {ns} = {object};"));
                    }
                    if !fields.is_empty() {
                        self.prelude
                            .push(format!("const {{ {} }} = {object};", fields.join(", ")));
                    }
                    self.blank(import.span);
                }
                ModuleDeclaration::ExportNamedDeclaration(named) => {
                    let Some(source) = &named.source else {
                        continue;
                    };
                    if named.export_kind.is_type() {
                        self.blank(named.span);
                        continue;
                    }

                    let dep = self.static_dep(source.value.as_str())?;
                    let object = modules_entry(&dep);
                    let mut fields = Vec::new();
                    let mut exported = Vec::new();
                    for specifier in &named.specifiers {
                        if specifier.export_kind.is_type() {
                            continue;
                        }
                        let temp = self.next_reexport();
                        fields.push(format!("{}: {temp}", property_key(&specifier.local.name())));
                        exported.push(format!("{temp} as {}", export_name(&specifier.exported.name())));
                    }

                    if !fields.is_empty() {
                        self.prelude
                            .push(format!("const {{ {} }} = {object};", fields.join(", ")));
                    }
                    self.replace(named.span, format!("export {{ {} }};", exported.join(", ")));
                }
                ModuleDeclaration::ExportAllDeclaration(all) => {
                    if all.export_kind.is_type() {
                        self.blank(all.span);
                        continue;
                    }
                    let Some(exported) = &all.exported else {
                        return Err(CompileError::new(format!(
                            "'export * from \"{}\"' is not supported in {}; re-export names explicitly",
                            all.source.value, self.location
                        )));
                    };

                    let dep = self.static_dep(all.source.value.as_str())?;
                    let temp = self.next_reexport();
                    self.prelude
                        .push(format!("const {temp} = {};", modules_entry(&dep)));
                    self.replace(
                        all.span,
                        format!("export {{ {temp} as {} }};", export_name(&exported.name())),
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn dynamic_import(&mut self, site: DynamicImportSite) -> Result<(), CompileError> {
        if let Some(literal) = &site.literal {
            let dep = ModuleSpecifier::resolve(literal, self.location)
                .map_err(|e| CompileError::new(e.to_string()))?;
            self.report.push_dynamic(dep);
        }

        let location = js_string(self.location);
        // `import(` up to the argument
        self.replace(
            Span::new(site.span.start, site.argument.start),
            format!("{DYNAMIC_IMPORT_FN}("),
        );
        // everything after the argument, options included
        self.replace(
            Span::new(site.argument.end, site.span.end),
            format!(", {location})"),
        );
        Ok(())
    }

    /// Whether the imported binding `local` survives into the output.
    fn retains(&self, scoping: &Scoping, local: &BindingIdentifier<'_>) -> bool {
        if !self.elide_unused || self.pragmas.contains(&local.name.as_str()) {
            return true;
        }
        let Some(symbol_id) = local.symbol_id.get() else {
            return true;
        };
        scoping
            .get_resolved_reference_ids(symbol_id)
            .iter()
            .any(|&reference_id| {
                let reference = scoping.get_reference(reference_id);
                reference.is_read() || reference.is_write()
            })
    }

    fn static_dep(&mut self, raw: &str) -> Result<ModuleSpecifier, CompileError> {
        let dep = ModuleSpecifier::resolve(raw, self.location)
            .map_err(|e| CompileError::new(e.to_string()))?;
        self.report.push_static(dep.clone());
        Ok(dep)
    }

    fn next_reexport(&mut self) -> String {
        let name = format!("__tsb_reexport_{}", self.reexports);
        self.reexports += 1;
        name
    }

    /// Replace `span` with newlines only, keeping the line count.
    fn blank(&mut self, span: Span) {
        let newlines = span.source_text(self.source).matches('\n').count();
        self.replace(span, "\n".repeat(newlines));
    }

    fn replace(&mut self, span: Span, replacement: String) {
        self.edits.push(Edit { span, replacement });
    }

    fn finish(mut self) -> Rewritten {
        self.edits.sort_by_key(|edit| edit.span.start);

        let mut code = String::with_capacity(self.source.len() + 64 * self.prelude.len());
        if !self.prelude.is_empty() {
            code.push_str(&self.prelude.join(" "));
            code.push(' ');
        }

        let mut cursor = 0;
        for edit in &self.edits {
            let start = edit.span.start as usize;
            code.push_str(&self.source[cursor..start]);
            code.push_str(&edit.replacement);
            cursor = edit.span.end as usize;
        }
        code.push_str(&self.source[cursor..]);

        Rewritten {
            code,
            report: self.report,
        }
    }
}

/// `__tsb_modules["<dep>"]`
fn modules_entry(dep: &ModuleSpecifier) -> String {
    format!("{MODULES_OBJECT}[{}]", js_string(dep.as_str()))
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c == '$' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

/// Key usable in a destructuring pattern.
fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

/// Name usable after `as` in an export clause.
fn export_name(name: &str) -> String {
    property_key(name)
}

struct DynamicImportSite {
    span: Span,
    argument: Span,
    literal: Option<String>,
}

#[derive(Default)]
struct DynamicImports {
    sites: Vec<DynamicImportSite>,
}

impl<'a> Visit<'a> for DynamicImports {
    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        let literal = match &it.source {
            Expression::StringLiteral(lit) => Some(lit.value.to_string()),
            _ => None,
        };
        self.sites.push(DynamicImportSite {
            span: it.span,
            argument: it.source.span(),
            literal,
        });
        walk::walk_import_expression(self, it);
    }
}
