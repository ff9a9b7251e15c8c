#![allow(clippy::unwrap_used)]
// Integration tests for `MoodoClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use moodo_api::{BoxStatus, BoxUpdate, Error, MoodoClient, RetryPolicy, SlotUpdate, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    interval: Duration::from_millis(10),
};

async fn setup() -> (MockServer, MoodoClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let token = SecretString::from("secret-token".to_string());
    let client = MoodoClient::new(base_url, &token, &TransportConfig::default())
        .unwrap()
        .with_retry(FAST_RETRY);
    (server, client)
}

fn box_json(key: u64, status: u8) -> serde_json::Value {
    json!({
        "device_key": key,
        "name": "Bedroom",
        "fan_volume": 60,
        "box_status": status,
        "settings": [
            { "slot_id": 0, "capsule_info": { "title": "Vanilla" }, "fan_speed": 40, "fan_active": true },
            { "slot_id": 1, "capsule_info": null, "fan_speed": 0, "fan_active": false },
            { "slot_id": 2, "capsule_info": { "title": "Citrus" }, "fan_speed": 60, "fan_active": true },
            { "slot_id": 3, "capsule_info": null, "fan_speed": 0, "fan_active": false }
        ]
    })
}

// ── Fetch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_all_sends_token_header() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .and(header("token", "secret-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "boxes": [box_json(100, 1)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let boxes = client.fetch_all().await.unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].device_key, 100);
    assert_eq!(boxes[0].box_status, BoxStatus::On);
    assert_eq!(boxes[0].settings[2].fan_speed, 60);
}

#[tokio::test]
async fn test_fetch_box() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/boxes/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "box": box_json(42, 0) })))
        .mount(&server)
        .await;

    let remote = client.fetch_box(42).await.unwrap();
    assert_eq!(remote.device_key, 42);
    assert_eq!(remote.box_status, BoxStatus::Off);
}

#[tokio::test]
async fn test_fetch_all_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.with_retry(RetryPolicy::none()).fetch_all().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_power_on_posts_empty_object() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/boxes/100"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "box": box_json(100, 1) })))
        .expect(1)
        .mount(&server)
        .await;

    client.power_on(100).await.unwrap();
}

#[tokio::test]
async fn test_power_off_uses_delete() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/boxes/100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.power_off(100).await.unwrap();
}

#[tokio::test]
async fn test_set_intensity() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/intensity/7"))
        .and(body_json(json!({ "fan_volume": 35 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.set_intensity(7, 35).await.unwrap();
}

#[tokio::test]
async fn test_apply_update_posts_whole_object() {
    let (server, client) = setup().await;

    let update = BoxUpdate {
        device_key: 100,
        fan_volume: 50,
        box_status: BoxStatus::On,
        settings_slot0: SlotUpdate::default(),
        settings_slot1: SlotUpdate {
            fan_speed: 50,
            fan_active: true,
        },
        settings_slot2: SlotUpdate::default(),
        settings_slot3: SlotUpdate::default(),
        restful_request_id: Some("req-1".into()),
    };

    Mock::given(method("POST"))
        .and(path("/api/boxes"))
        .and(body_json(json!({
            "device_key": 100,
            "fan_volume": 50,
            "box_status": 1,
            "settings_slot0": { "fan_speed": 0, "fan_active": false },
            "settings_slot1": { "fan_speed": 50, "fan_active": true },
            "settings_slot2": { "fan_speed": 0, "fan_active": false },
            "settings_slot3": { "fan_speed": 0, "fan_active": false },
            "restful_request_id": "req-1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.apply_update(&update).await.unwrap();
}

// ── Errors & retry ──────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let result = client.with_retry(RetryPolicy::none()).fetch_all().await;
    assert!(
        matches!(result, Err(Error::Unauthorized { status: 401 })),
        "expected Unauthorized, got: {result:?}"
    );
}

#[tokio::test]
async fn test_retry_exhaustion_makes_exactly_budget_attempts() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/boxes/9"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let result = client.power_on(9).await;
    match result {
        Err(Error::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Status error, got: {other:?}"),
    }

    server.verify().await;
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failure() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/boxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "boxes": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let boxes = client.fetch_all().await.unwrap();
    assert!(boxes.is_empty());
}

#[tokio::test]
async fn test_zero_budget_still_attempts_once() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/boxes/3"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let client = client.with_retry(RetryPolicy {
        max_attempts: 0,
        interval: Duration::ZERO,
    });
    assert!(client.power_off(3).await.is_err());
}
