//! OXC compiler units driven by the module loader.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};
use tsb_core::source::MemorySource;
use tsb_core::test_utils::ScriptedHost;
use tsb_core::{
    Binding, CircularAccess, CompileOptions, Exports, HostModule, LoaderError, ModuleLoader,
    ModuleSpecifier, SourceKind,
};

static HOISTED_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"const \{ ([^}]*) \} = __tsb_modules\["([^"]+)"\];"#).unwrap()
});

/// Run the hoisted `const { .. } = __tsb_modules[..];` lines of a compiled
/// module, returning its imported bindings by local name.
fn bind_imports(module: &HostModule<'_>) -> tsb_core::Result<HashMap<String, Binding>> {
    let mut bindings = HashMap::new();
    for captures in HOISTED_IMPORT.captures_iter(module.code) {
        let dependency = module.scope.module(&captures[2]).expect("dependency is in scope");
        for field in captures[1].split(", ") {
            let (imported, local) = field.split_once(": ").unwrap_or((field, field));
            if let Some(binding) = dependency.get(imported)? {
                bindings.insert(local.to_string(), binding);
            }
        }
    }
    Ok(bindings)
}

fn call(binding: &Binding, args: &[Value]) -> tsb_core::Result<Value> {
    match binding {
        Binding::Function(f) => f(args),
        Binding::Deferred(deferred) => deferred.call(args),
        Binding::Value(value) => panic!("{value} is not callable"),
    }
}

fn loader(source: &MemorySource, host: &ScriptedHost) -> ModuleLoader {
    ModuleLoader::builder(
        Arc::new(source.clone()),
        Arc::new(host.clone()),
        tsb_transpile::factory(),
    )
    .pool_size(2)
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_typescript_graph_loads() {
    let source = MemorySource::new()
        .with_file(
            "/src/main.ts",
            "import type { Config } from './types';\nimport { greet } from './greet';\nconst config: Config = { name: 'tsb' };\nexport const main = 1;\ngreet(config.name);\n",
        )
        .with_file("/src/types.ts", "export interface Config { name: string }\n")
        .with_file(
            "/src/greet.ts",
            "export function greet(name: string): string {\n  return `hello ${name}`;\n}\n",
        );
    let host = ScriptedHost::new();
    let loader = loader(&source, &host);

    let main = loader.load_module("/src/main").await.unwrap();

    assert_eq!(host.evaluated(), vec!["/src/greet", "/src/main"]);
    assert_eq!(source.request_count("/src/types.ts"), 0);
    assert!(main.get("main").is_some());

    let code = host.code_for("/src/main").unwrap();
    assert!(code.contains("__tsb_modules[\"/src/greet\"]"), "{code}");
    assert!(!code.contains("Config"), "{code}");
    assert!(code.ends_with("//# sourceURL=/src/main"));
}

#[tokio::test]
async fn test_tsx_entry_with_custom_pragma() {
    let source = MemorySource::new().with_file(
        "/app/view.tsx",
        "export const view = (title: string) => <h1 class=\"title\">{title}</h1>;\n",
    );
    let host = ScriptedHost::new();
    let loader = loader(&source, &host);

    let options = CompileOptions {
        jsx: true,
        jsx_pragma: "h".to_string(),
        ..CompileOptions::default()
    };
    loader.load_module_with("/app/view", &options).await.unwrap();

    let code = host.code_for("/app/view").unwrap();
    assert!(code.contains("h(\"h1\""), "{code}");
    assert_eq!(source.request_count("/app/view.tsx"), 1);
}

#[tokio::test]
async fn test_plain_script_passes_through() {
    let source = MemorySource::new()
        .with_file("/main.ts", "import './vendor/legacy.js';\nexport const ready = true;\n")
        .with_file("/vendor/legacy.js", "window.legacy = { version: 1 };\n");
    let host = ScriptedHost::new();
    let loader = loader(&source, &host);

    loader.load_module("/main").await.unwrap();

    let legacy = loader
        .registry()
        .get(&ModuleSpecifier::parse("/vendor/legacy.js").unwrap())
        .unwrap();
    assert_eq!(legacy.kind, SourceKind::Script);
    assert_eq!(
        host.code_for("/vendor/legacy.js").unwrap(),
        "window.legacy = { version: 1 };\n//# sourceURL=/vendor/legacy.js"
    );
}

#[tokio::test]
async fn test_syntax_error_is_a_compile_failure() {
    let source = MemorySource::new().with_file("/broken.ts", "export const = ;\n");
    let host = ScriptedHost::new();

    let err = loader(&source, &host).load_module("/broken").await.unwrap_err();
    match err {
        LoaderError::CompileFailure { specifier, message, .. } => {
            assert_eq!(specifier.as_str(), "/broken");
            assert!(message.contains("/broken.ts"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_export_star_fails_the_request() {
    let source = MemorySource::new()
        .with_file("/index.ts", "export * from './all';\n")
        .with_file("/all.ts", "export const a = 1;\n");
    let host = ScriptedHost::new();

    let err = loader(&source, &host).load_module("/index").await.unwrap_err();
    assert!(matches!(err, LoaderError::CompileFailure { .. }));
    assert_eq!(source.request_count("/all.ts"), 0);
}

fn cycle(b_source: &str) -> MemorySource {
    MemorySource::new()
        .with_file(
            "/a.ts",
            "import { useA } from './b';\nexport function a(): string {\n  return 'from a';\n}\nexport const run = () => useA();\n",
        )
        .with_file("/b.ts", b_source)
}

fn cycle_host() -> ScriptedHost {
    ScriptedHost::new()
        .script("/a", |module| {
            let imports = bind_imports(module)?;
            let use_a = imports["useA"].clone();
            Ok(Exports::new()
                .with_function("a", |_args| Ok(json!("from a")))
                .with_function("run", move |args| call(&use_a, args)))
        })
        .script("/b", |module| {
            let imports = bind_imports(module)?;
            let a = imports["a"].clone();
            if module.code.contains("export const early") {
                call(&a, &[])?;
            }
            Ok(Exports::new().with_function("useA", move |args| call(&a, args)))
        })
}

#[tokio::test]
async fn test_cycle_named_import_used_after_load() {
    let source = cycle(
        "import { a } from './a';\nexport function useA(): string {\n  return a();\n}\n",
    );
    let host = cycle_host();
    let loader = loader(&source, &host);

    let a = loader.load_module("/a").await.unwrap();

    assert_eq!(host.evaluated(), vec!["/b", "/a"]);
    assert!(
        host.code_for("/b")
            .unwrap()
            .starts_with("const { a } = __tsb_modules[\"/a\"];")
    );
    assert_eq!(a.call("run", &[]).unwrap(), json!("from a"));
}

#[tokio::test]
async fn test_cycle_named_import_used_during_load_fails() {
    let source = cycle("import { a } from './a';\nexport const early = a();\n");
    let host = cycle_host();

    let err = loader(&source, &host).load_module("/a").await.unwrap_err();
    match err {
        LoaderError::CircularAccessBeforeInit {
            target,
            requester,
            member,
        } => {
            assert_eq!(target.as_str(), "/a");
            assert_eq!(requester.as_str(), "/b");
            assert_eq!(member, CircularAccess::Call("a".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_import_used_only_as_a_type_is_not_loaded() {
    let source = MemorySource::new()
        .with_file(
            "/src/main.ts",
            "import { Props } from './props';\nimport { render } from './render';\nconst props: Props = { title: 'tsb' };\nexport const main = render(props);\n",
        )
        .with_file("/src/props.ts", "export interface Props { title: string }\n")
        .with_file("/src/render.ts", "export const render = 1;\n");
    let host = ScriptedHost::new();
    let loader = loader(&source, &host);

    loader.load_module("/src/main").await.unwrap();

    assert_eq!(host.evaluated(), vec!["/src/render", "/src/main"]);
    assert_eq!(source.request_count("/src/props.ts"), 0);
    assert!(!host.code_for("/src/main").unwrap().contains("Props"));
}
