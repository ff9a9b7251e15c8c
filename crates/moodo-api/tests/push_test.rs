#![allow(clippy::unwrap_used)]
// Integration tests for the push channel against a local socket.io server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use moodo_api::{PushConfig, PushHandle, PushStatus, ReconnectConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const AUTH_DELAY: Duration = Duration::from_millis(50);
const SUBSCRIBE_DELAY: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(5);

const OPEN: &str = r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#;
const STATE_EVENT: &str =
    r#"42["ws_event",{"data":{"device_key":100,"box_status":1,"fan_volume":30}}]"#;

/// A text frame the client sent, tagged with its connection number.
#[derive(Debug)]
struct Received {
    connection: usize,
    text: String,
    /// Time since the server sent the namespace connect packet.
    after_connect: Duration,
}

/// Accept `connections` clients in turn. Each gets the open and connect
/// packets; the first two frames it sends are reported. After the handshake
/// the server pushes one box update and drops the socket.
async fn spawn_server(connections: usize) -> (Url, mpsc::UnboundedReceiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for connection in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            ws.send(Message::text(OPEN.to_owned())).await.unwrap();
            ws.send(Message::text("40".to_owned())).await.unwrap();
            let connected_at = Instant::now();

            let mut handshake = 0;
            while handshake < 2 {
                let Some(Ok(frame)) = ws.next().await else { return };
                if let Message::Text(text) = frame {
                    tx.send(Received {
                        connection,
                        text: text.to_string(),
                        after_connect: connected_at.elapsed(),
                    })
                    .unwrap();
                    handshake += 1;
                }
            }

            ws.send(Message::text(STATE_EVENT.to_owned())).await.unwrap();
            ws.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(ws);
        }
    });

    (url, rx)
}

fn push_config(url: Url) -> PushConfig {
    let mut config = PushConfig::new(url, SecretString::from("tok".to_string()));
    config.auth_delay = AUTH_DELAY;
    config.subscribe_delay = SUBSCRIBE_DELAY;
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_retries: None,
    };
    config
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Received>) -> Received {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_authenticates_then_subscribes() {
    let (url, mut frames) = spawn_server(1).await;
    let handle = PushHandle::connect(push_config(url), CancellationToken::new()).unwrap();

    let auth = next_frame(&mut frames).await;
    assert_eq!(auth.text, r#"42["authenticate","tok"]"#);
    assert!(auth.after_connect >= AUTH_DELAY, "{auth:?}");

    let subscribe = next_frame(&mut frames).await;
    assert_eq!(subscribe.text, r#"42["subscribe","homebridge"]"#);
    assert!(subscribe.after_connect >= AUTH_DELAY + SUBSCRIBE_DELAY, "{subscribe:?}");

    handle.shutdown();
}

#[tokio::test]
async fn test_pushed_state_reaches_subscribers() {
    let (url, _frames) = spawn_server(1).await;
    let handle = PushHandle::connect(push_config(url), CancellationToken::new()).unwrap();
    let mut events = handle.subscribe();

    let remote = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(remote.device_key, 100);
    assert_eq!(remote.fan_volume, 30);

    handle.shutdown();
}

#[tokio::test]
async fn test_handshake_repeats_after_reconnect() {
    let (url, mut frames) = spawn_server(2).await;
    let handle = PushHandle::connect(push_config(url), CancellationToken::new()).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let frame = next_frame(&mut frames).await;
        seen.push((frame.connection, frame.text));
    }

    assert_eq!(
        seen,
        vec![
            (0, r#"42["authenticate","tok"]"#.to_string()),
            (0, r#"42["subscribe","homebridge"]"#.to_string()),
            (1, r#"42["authenticate","tok"]"#.to_string()),
            (1, r#"42["subscribe","homebridge"]"#.to_string()),
        ]
    );

    handle.shutdown();
}

#[tokio::test]
async fn test_status_follows_connection() {
    let (url, _frames) = spawn_server(1).await;
    let cancel = CancellationToken::new();
    let handle = PushHandle::connect(push_config(url), cancel.clone()).unwrap();
    let mut status = handle.status();

    timeout(WAIT, status.wait_for(|s| *s == PushStatus::Subscribed))
        .await
        .unwrap()
        .unwrap();

    cancel.cancel();
    timeout(WAIT, status.wait_for(|s| *s == PushStatus::Disconnected))
        .await
        .unwrap()
        .unwrap();
}
