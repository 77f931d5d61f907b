//! TypeScript and JSX lowering.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};

use tsb_core::specifier::extension_of;
use tsb_core::{CompileError, CompileOptions};

/// Whether the source at `location` needs lowering before a browser can run
/// it. Plain JavaScript is served as written.
pub fn needs_transform(location: &str) -> bool {
    !matches!(extension_of(location), Some("js" | "mjs" | "cjs"))
}

/// Strip types and lower JSX with the classic runtime, then print.
pub fn transform(
    code: &str,
    location: &str,
    source_type: SourceType,
    options: &CompileOptions,
) -> Result<String, CompileError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(diagnostics_error("parse", location, &parsed.errors));
    }
    let mut program = parsed.program;

    let semantic = SemanticBuilder::new().build(&program);
    if !semantic.errors.is_empty() {
        return Err(diagnostics_error("analyze", location, &semantic.errors));
    }
    let scoping = semantic.semantic.into_scoping();

    let transform_options = TransformOptions {
        jsx: JsxOptions {
            runtime: JsxRuntime::Classic,
            pragma: Some(options.jsx_pragma.clone()),
            pragma_frag: Some(options.jsx_pragma_frag.clone()),
            ..JsxOptions::default()
        },
        ..TransformOptions::default()
    };
    let transformed = Transformer::new(&allocator, Path::new(location), &transform_options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(diagnostics_error("transform", location, &transformed.errors));
    }

    Ok(Codegen::new().build(&program).code)
}

fn diagnostics_error<E: std::fmt::Display>(stage: &str, location: &str, errors: &[E]) -> CompileError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    CompileError::new(format!(
        "failed to {stage} {location}: {}",
        messages.join(", ")
    ))
}
