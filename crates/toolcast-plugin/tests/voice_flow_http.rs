//! End-to-end: transcript in, lifecycle envelopes out over the HTTP fallback.
//!
//! No data channel is attached, so every envelope the flow emits must reach
//! the mock `/api/tools/events` endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolcast_channels::{DualPathBroadcaster, HttpFallback};
use toolcast_plugin::{
    ExecutionContext, Permission, ToolCategory, ToolPlugin, ToolRegistry, VoiceToolFlow, handler_fn,
};
use toolcast_types::{FallbackConfig, Locale, ToolResult};

fn registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolPlugin::new(
                "flashcards",
                "Flashcard",
                ToolCategory::Educational,
                handler_fn(|_, _| async { Ok(ToolResult::ok(json!({ "itemCount": 12 }))) }),
            )
            .with_permissions([Permission::WriteContent])
            .with_triggers(["crea delle flashcard", "flashcard"])
            .with_voice_feedback("Ho preparato {itemCount} flashcard"),
        )
        .unwrap();
    Arc::new(registry)
}

async fn bodies(server: &MockServer, expected: usize) -> Vec<Value> {
    let mut received = Vec::new();
    for _ in 0..100 {
        received = server.received_requests().await.unwrap_or_default();
        if received.len() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    received
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn lifecycle_reaches_fallback_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tools/events"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = FallbackConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let broadcaster = DualPathBroadcaster::new(Arc::new(HttpFallback::from_config(&config)), Some("voice-1".into()));
    let flow = VoiceToolFlow::from_registry(registry(), Locale::It).with_broadcaster(Arc::new(broadcaster));

    let ctx = ExecutionContext::new("student-7", "voice-1")
        .with_maestro("curie")
        .with_permissions([Permission::WriteContent]);
    let outcome = flow.process_transcript("Mi crei delle flashcard sui vulcani?", &ctx).await;
    assert_eq!(outcome.voice_feedback, "Ho preparato 12 flashcard");

    let bodies = bodies(&server, 4).await;
    assert_eq!(bodies.len(), 4);

    let mut types: Vec<&str> = bodies.iter().map(|b| b["event"]["type"].as_str().unwrap()).collect();
    types.sort_unstable();
    assert_eq!(types, vec!["ACCEPTED", "COMPLETED", "EXECUTING", "PROPOSED"]);

    for body in &bodies {
        assert_eq!(body["sessionId"], "voice-1");
        assert_eq!(body["event"]["toolType"], "flashcards");
        assert_eq!(body["event"]["maestroId"], "curie");
        assert_eq!(body["event"]["toolId"], bodies[0]["event"]["toolId"]);
    }
}

#[tokio::test]
async fn missing_permission_is_rejected_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tools/events"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = FallbackConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let broadcaster = DualPathBroadcaster::new(Arc::new(HttpFallback::from_config(&config)), None);
    let flow = VoiceToolFlow::from_registry(registry(), Locale::En).with_broadcaster(Arc::new(broadcaster));

    let outcome = flow
        .process_transcript("flashcard please", &ExecutionContext::new("student-7", "voice-1"))
        .await;
    assert_eq!(outcome.voice_feedback, "I'm not allowed to use that tool.");

    let bodies = bodies(&server, 2).await;
    let rejected = bodies
        .iter()
        .find(|b| b["event"]["type"] == "REJECTED")
        .expect("REJECTED envelope");
    assert_eq!(rejected["event"]["payload"]["code"], "PERMISSION_DENIED");
    assert_eq!(rejected["sessionId"], Value::Null);
}
