//! End-to-end evaluator scenarios over the in-process bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;

use hearth_bus::{MemoryClient, Value};
use hearth_dsl::parse;
use hearth_runtime::{Config, EvalError, Evaluator, Outcome};

async fn evaluator_with(client: &MemoryClient) -> Evaluator {
    Evaluator::with_client(Config::default(), Arc::new(client.clone()))
        .await
        .unwrap()
}

async fn eval_src(evaluator: &Evaluator, src: &str) -> Result<Outcome, EvalError> {
    evaluator.eval(&parse(src).unwrap()).await
}

/// Give background tasks a chance to drain their channels.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_set_forwards_to_bus() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let outcome = eval_src(&evaluator, "set a/b on").await.unwrap();
    assert_eq!(outcome.to_string(), "");

    let sets = client.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(
        (sets[0].toplevel.as_str(), sets[0].item.as_str(), sets[0].value.as_str()),
        ("a", "b", "on")
    );
    evaluator.close().await;
}

#[tokio::test]
async fn test_get_uses_cached_registry_value() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    client.publish_status("a", "b", Value::new("off"));
    settle().await;

    // No get response is scripted: reaching the live path would time out.
    let outcome = eval_src(&evaluator, "get a/b").await.unwrap();
    assert_eq!(outcome.to_string(), "off\n");
    evaluator.close().await;
}

#[tokio::test]
async fn test_get_without_cache_times_out() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let err = eval_src(&evaluator, "get a/b").await.unwrap_err();
    assert_eq!(err.to_string(), "timed out waiting for get response");
    evaluator.close().await;
}

#[tokio::test]
async fn test_scene_start_stop_lifecycle() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(
        &evaluator,
        "scene night { set a/b on }\nstart night\nstop night",
    )
    .await
    .unwrap();
    assert_eq!(client.sets().len(), 1);

    // The scene map is empty after stop.
    let err = eval_src(&evaluator, "stop night").await.unwrap_err();
    assert!(matches!(err, EvalError::UnknownScene(name) if name == "night"));
    evaluator.close().await;
}

#[tokio::test]
async fn test_stop_of_never_started_scene_succeeds() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(&evaluator, "scene idle { set a/b on }").await.unwrap();
    // Defined but never started: nothing to tear down, stop succeeds.
    eval_src(&evaluator, "stop idle").await.unwrap();
    assert!(client.sets().is_empty());

    let err = eval_src(&evaluator, "stop idle").await.unwrap_err();
    assert!(matches!(err, EvalError::UnknownScene(_)));
    evaluator.close().await;
}

#[tokio::test]
async fn test_when_with_wait_fires_once_per_match() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(&evaluator, "when a/b is on wait 10ms set a/c off")
        .await
        .unwrap();

    // A non-matching value fires nothing.
    client.publish_status("a", "b", Value::new("off"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(client.sets().is_empty());

    client.publish_status("a", "b", Value::new("on"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    let sets = client.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(
        (sets[0].toplevel.as_str(), sets[0].item.as_str(), sets[0].value.as_str()),
        ("a", "c", "off")
    );
    evaluator.close().await;
}

#[tokio::test]
async fn test_when_stops_after_scene_stop() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(
        &evaluator,
        "scene watch { when a/b is on set a/c off }\nstart watch",
    )
    .await
    .unwrap();

    client.publish_status("a", "b", Value::new("on"));
    settle().await;
    assert_eq!(client.sets().len(), 1);

    eval_src(&evaluator, "stop watch").await.unwrap();
    settle().await;
    client.publish_status("a", "b", Value::new("on"));
    settle().await;
    assert_eq!(client.sets().len(), 1);
    evaluator.close().await;
}

#[tokio::test]
async fn test_restart_without_stop_is_additive() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(
        &evaluator,
        "scene watch { when a/b is on set a/c off }\nstart watch\nstart watch",
    )
    .await
    .unwrap();

    client.publish_status("a", "b", Value::new("on"));
    settle().await;
    // Both registrations are live under the same scene.
    assert_eq!(client.sets().len(), 2);

    // One stop tears both down.
    eval_src(&evaluator, "stop watch").await.unwrap();
    settle().await;
    client.publish_status("a", "b", Value::new("on"));
    settle().await;
    assert_eq!(client.sets().len(), 2);
    evaluator.close().await;
}

#[tokio::test]
async fn test_at_schedules_daily_event() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    eval_src(
        &evaluator,
        "scene night { set a/b on }\nat 10:00 PM start night",
    )
    .await
    .unwrap();

    let upcoming = evaluator.upcoming();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].time.hour(), 22);
    assert_eq!(upcoming[0].time.minute(), 0);
    assert!(upcoming[0].description.contains("night"));
    evaluator.close().await;
}

#[tokio::test]
async fn test_wildcard_set_fans_out_over_registry() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    client.publish_status("house", "room1/light", Value::new("on"));
    client.publish_status("house", "room2/light", Value::new("on"));
    client.publish_status("house", "room2/switch", Value::new("on"));
    settle().await;

    eval_src(&evaluator, "set house/*/light off").await.unwrap();
    let mut items: Vec<String> = client.sets().into_iter().map(|s| s.item).collect();
    items.sort();
    assert_eq!(items, vec!["room1/light", "room2/light"]);
    evaluator.close().await;
}

#[tokio::test]
async fn test_var_statement_evaluates_without_error() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    client.publish_status("a", "b", Value::new("21"));
    settle().await;

    let outcome = eval_src(&evaluator, "var x = get a/b").await.unwrap();
    assert_eq!(outcome.to_string(), "");
    evaluator.close().await;
}

#[tokio::test]
async fn test_empty_program_yields_empty_list() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let outcome = eval_src(&evaluator, "").await.unwrap();
    assert_eq!(outcome, Outcome::List(Vec::new()));
    assert_eq!(outcome.to_string(), "");
    evaluator.close().await;
}

#[tokio::test]
async fn test_unknown_time_keyword() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let err = eval_src(&evaluator, "at noon set a/b on").await.unwrap_err();
    assert!(matches!(err, EvalError::UnknownTimeKeyword(word) if word == "noon"));
    evaluator.close().await;
}

#[tokio::test]
async fn test_path_without_separator_is_rejected() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let err = eval_src(&evaluator, "set lonely on").await.unwrap_err();
    assert!(matches!(err, EvalError::InvalidPath(path) if path == "lonely"));

    let err = eval_src(&evaluator, "set $ locked").await.unwrap_err();
    assert!(matches!(err, EvalError::InvalidPath(path) if path == "$"));
    evaluator.close().await;
}

#[tokio::test]
async fn test_error_aborts_remaining_statements() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let err = eval_src(&evaluator, "start ghost\nset a/b on").await.unwrap_err();
    assert!(matches!(err, EvalError::UnknownScene(_)));
    assert!(client.sets().is_empty());
    evaluator.close().await;
}

#[tokio::test]
async fn test_start_unknown_scene() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;

    let err = eval_src(&evaluator, "start ghost").await.unwrap_err();
    assert!(matches!(err, EvalError::UnknownScene(name) if name == "ghost"));
    evaluator.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let client = MemoryClient::new();
    let evaluator = evaluator_with(&client).await;
    evaluator.close().await;
    evaluator.close().await;
}
