//! Run-time `import()` through the loader.

mod helpers;

use std::sync::Arc;

use helpers::{Fixture, spec};
use parking_lot::Mutex;
use serde_json::json;
use tsb_core::source::MemorySource;
use tsb_core::test_utils::ScriptedHost;
use tsb_core::{CompileCache, DynamicImporter, MemoryCacheStore};

fn plugin_app() -> MemorySource {
    MemorySource::new()
        .with_file(
            "/app/main.ts",
            "export const load = (name) => import(`./plugins/${name}`);\nexport const main = 1;\n",
        )
        .with_file(
            "/app/plugins/chart.ts",
            "import { theme } from '../theme';\nexport const chart = \"bar\";\n",
        )
        .with_file("/app/theme.ts", "export const theme = \"dark\";\n")
}

#[tokio::test]
async fn test_non_literal_target_loads_at_run_time() {
    let fixture = Fixture::new(plugin_app());
    let loader = fixture.loader();

    loader.load_module("/app/main").await.unwrap();
    assert_eq!(fixture.counter.total(), 1, "template import is not pre-resolved");

    let chart = loader
        .import_dynamic("./plugins/chart", "/app/main.ts")
        .await
        .unwrap();
    assert_eq!(chart.specifier, spec("/app/plugins/chart"));
    assert_eq!(chart.get("chart").and_then(|b| b.as_value().cloned()), Some(json!("bar")));
    assert!(loader.registry().is_loaded(&spec("/app/theme")));

    let compiled = fixture.counter.total();
    let requests = fixture.source.requests().len();
    let again = loader
        .import_dynamic("./chart", "/app/plugins/index.ts")
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&chart, &again));
    assert_eq!(fixture.counter.total(), compiled);
    assert_eq!(fixture.source.requests().len(), requests);
}

#[tokio::test]
async fn test_host_imports_through_its_handle() {
    let captured: Arc<Mutex<Option<DynamicImporter>>> = Arc::default();
    let slot = Arc::clone(&captured);
    let host = ScriptedHost::new().script("/app/main", move |module| {
        *slot.lock() = Some(module.importer.clone());
        Ok(tsb_core::test_utils::declared_exports(module.code))
    });
    let fixture = Fixture::with_host(plugin_app(), host);
    let loader = fixture.loader();

    loader.load_module("/app/main").await.unwrap();
    let importer = captured.lock().clone().unwrap();
    assert!(importer.is_attached());

    let chart = importer.import("./plugins/chart", "/app/main.ts").await.unwrap();
    assert_eq!(fixture.host.evaluation_count("/app/plugins/chart"), 1);
    assert_eq!(chart.exports.names().collect::<Vec<_>>(), vec!["chart"]);
}

#[tokio::test]
async fn test_literal_dynamic_target_is_compiled_ahead_but_loaded_on_demand() {
    let fixture = Fixture::new(
        MemorySource::new()
            .with_file("/main.ts", "export const open = () => import('./dialog');\n")
            .with_file("/dialog.ts", "export const dialog = 1;\n"),
    );
    let loader = fixture.loader();

    loader.load_module("/main").await.unwrap();
    assert_eq!(fixture.counter.count("/dialog"), 1);
    assert_eq!(fixture.host.evaluation_count("/dialog"), 0);

    loader.import_dynamic("./dialog", "/main.ts").await.unwrap();
    assert_eq!(fixture.host.evaluation_count("/dialog"), 1);
    assert_eq!(fixture.counter.count("/dialog"), 1, "prepared compile is reused");
    assert_eq!(fixture.source.request_count("/dialog.ts"), 1);
}

#[tokio::test]
async fn test_prepared_compile_is_not_reused_with_other_options() {
    let fixture = Fixture::new(
        MemorySource::new()
            .with_file("/main.ts", "export const open = () => import('./dialog');\n")
            .with_file("/dialog.ts", "export const dialog = 1;\n"),
    );
    let loader = fixture.loader();

    let jsx = tsb_core::CompileOptions::default().with_jsx(true);
    loader.load_module_with("/main", &jsx).await.unwrap();
    assert_eq!(fixture.counter.count("/dialog"), 1);

    // Dynamic imports compile with the loader's default options.
    loader.import_dynamic("./dialog", "/main.ts").await.unwrap();
    assert_eq!(fixture.counter.count("/dialog"), 2);
}

#[tokio::test]
async fn test_run_time_imports_populate_the_cache() {
    let cache: Arc<dyn CompileCache> = Arc::new(MemoryCacheStore::new());
    let fixture = Fixture::new(plugin_app());
    let loader = fixture.loader_with_cache(Arc::clone(&cache));

    loader.load_module("/app/main").await.unwrap();
    assert_eq!(cache.len().unwrap(), 1);

    loader
        .import_dynamic("./plugins/chart", "/app/main.ts")
        .await
        .unwrap();
    assert_eq!(cache.len().unwrap(), 3);
}
