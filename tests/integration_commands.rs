use std::sync::Arc;

use serde_json::json;
use surface_wm::backend::{HeadlessBackend, SuspensionPoint};
use surface_wm::command::{Command, Response};
use surface_wm::config::EngineConfig;
use surface_wm::engine::Engine;

fn engine() -> (Arc<HeadlessBackend>, Arc<Engine>) {
    let backend = Arc::new(HeadlessBackend::new());
    let mut config = EngineConfig::default();
    config.lifecycle.auto_sweep = false;
    (backend.clone(), Engine::new(backend, config))
}

async fn run(engine: &Arc<Engine>, command: serde_json::Value) -> Response {
    let command: Command = serde_json::from_value(command).unwrap();
    engine.execute(command).await
}

fn show_calc() -> serde_json::Value {
    json!({
        "command": "show_view",
        "category": "plugin",
        "path": "calc",
        "source": { "kind": "url", "location": "app://plugins/calc" },
        "descriptor": { "fullPath": "/plugins/calc", "name": "Calculator", "version": "1.0.0" }
    })
}

#[tokio::test]
async fn json_commands_drive_the_engine() {
    let (backend, engine) = engine();
    let resp = run(&engine, json!({ "command": "create_main_window" })).await;
    assert!(resp.success);
    let main = resp.data.unwrap();

    let resp = run(&engine, show_calc()).await;
    assert!(resp.success);
    assert_eq!(resp.data, Some(json!("plugin:calc")));

    let resp = run(
        &engine,
        json!({ "command": "detach_view", "view_id": "plugin:calc", "options": { "title": null } }),
    )
    .await;
    assert!(resp.success, "{resp:?}");
    let detached = resp.data.unwrap();
    assert_ne!(detached, main);
    let detached_title = backend
        .windows()
        .into_iter()
        .find(|(_, w)| w.chromeless)
        .map(|(_, w)| w.title)
        .unwrap();
    assert_eq!(detached_title, "Calculator");

    let resp = run(&engine, json!({ "command": "get_statistics" })).await;
    let stats = resp.data.unwrap();
    assert_eq!(stats["detached_windows"], 1);
    assert_eq!(stats["detach"]["detached_views"], json!(["plugin:calc"]));

    let resp = run(
        &engine,
        json!({ "command": "control_bar", "window_id": detached, "action": "reattach" }),
    )
    .await;
    assert!(resp.success, "{resp:?}");

    let resp = run(&engine, json!({ "command": "get_view_info", "view_id": "plugin:calc" })).await;
    let info = resp.data.unwrap();
    assert_eq!(info["owner_window_id"], main);
    assert_eq!(info["active"], true);

    let resp = run(&engine, json!({ "command": "close_view", "view_id": "plugin:calc" })).await;
    assert_eq!(resp.data, Some(json!("destroyed")));
    let resp = run(&engine, json!({ "command": "get_all_views" })).await;
    assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn failures_come_back_as_typed_errors() {
    let (_backend, engine) = engine();
    let resp = run(&engine, show_calc()).await;
    assert!(!resp.success);
    assert_eq!(resp.error_kind(), Some("not_found"));

    run(&engine, json!({ "command": "create_main_window" })).await;
    let resp = run(&engine, json!({ "command": "close_view", "view_id": "nope" })).await;
    assert_eq!(resp.error_kind(), Some("not_found"));

    let resp = run(
        &engine,
        json!({ "command": "detach_view", "view_id": "main-view" }),
    )
    .await;
    assert_eq!(resp.error_kind(), Some("not_permitted"));
    assert!(resp.data.is_none());
}

#[tokio::test]
async fn panic_in_handler_becomes_failed_response() {
    let (backend, engine) = engine();
    run(&engine, json!({ "command": "create_main_window" })).await;

    backend.on_next(
        SuspensionPoint::CreateSurface,
        Box::new(|_: &HeadlessBackend| panic!("renderer exploded")),
    );
    let resp = run(&engine, show_calc()).await;
    assert!(!resp.success);
    assert_eq!(resp.error_kind(), Some("internal"));
    assert_eq!(resp.error.unwrap().message, "renderer exploded");

    // engine still usable, and the half-created view did not stick
    let resp = run(&engine, show_calc()).await;
    assert!(resp.success, "{resp:?}");
    let resp = run(&engine, json!({ "command": "get_statistics" })).await;
    assert_eq!(resp.data.unwrap()["views"], 2);
}

#[tokio::test]
async fn metrics_and_cleanup_are_serializable() {
    let (_backend, engine) = engine();
    run(&engine, json!({ "command": "create_main_window" })).await;
    let resp = run(&engine, json!({ "command": "get_performance_metrics" })).await;
    let metrics = resp.data.unwrap();
    assert_eq!(metrics["active_view_count"], 1);
    assert!(metrics["windows"].as_object().unwrap().len() == 1);

    let resp = run(&engine, json!({ "command": "cleanup_background_views" })).await;
    assert_eq!(resp.data.unwrap()["destroyed"], json!([]));
}
