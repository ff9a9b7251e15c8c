//! Push update channel with auto-reconnect.
//!
//! Connects to the Moodo socket.io endpoint over a plain WebSocket, speaks
//! the Engine.IO v3 framing by hand, authenticates, subscribes, and streams
//! every box snapshot the server pushes through a
//! [`tokio::sync::broadcast`] channel. Reconnects with exponential
//! backoff + jitter and repeats the handshake each time.
//!
//! # Example
//!
//! ```rust,ignore
//! use moodo_api::push::{PushConfig, PushHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PushConfig::new(Url::parse("https://ws.moodo.co:9090")?, token);
//! let handle = PushHandle::connect(config, CancellationToken::new())?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(remote) = rx.recv().await {
//!     println!("box {} changed", remote.device_key);
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::{Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::RemoteBox;

/// Default socket.io endpoint of the Moodo cloud.
pub const DEFAULT_SOCKET_URL: &str = "https://ws.moodo.co:9090";

/// Topic the bridge subscribes to after authenticating.
pub const DEFAULT_TOPIC: &str = "homebridge";

const EVENT_CHANNEL_CAPACITY: usize = 256;

const STATE_EVENT: &str = "ws_event";

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushConfig ───────────────────────────────────────────────────────

/// Everything the push task needs to connect and subscribe.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Socket base URL (`http(s)://` or `ws(s)://`).
    pub url: Url,
    pub token: SecretString,
    pub topic: String,
    /// Pause between namespace connect and `authenticate`.
    pub auth_delay: Duration,
    /// Pause between `authenticate` and `subscribe`.
    pub subscribe_delay: Duration,
    pub reconnect: ReconnectConfig,
}

impl PushConfig {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            topic: DEFAULT_TOPIC.to_owned(),
            auth_delay: Duration::from_secs(1),
            subscribe_delay: Duration::from_secs(2),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// The WebSocket URL of the Engine.IO v3 transport.
    pub fn socket_url(&self) -> Result<Url, Error> {
        let mut url = self.url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::WebSocketConnect(format!(
                    "unsupported socket scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme}")))?;
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=3&transport=websocket"));
        Ok(url)
    }
}

// ── PushStatus ───────────────────────────────────────────────────────

/// Lifecycle of the push connection, observable through [`PushHandle::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Disconnected,
    Connecting,
    /// Socket namespace connected; handshake in progress.
    Connected,
    /// `subscribe` sent; box updates are flowing.
    Subscribed,
}

// ── PushHandle ───────────────────────────────────────────────────────

/// Handle to a running push connection.
pub struct PushHandle {
    event_rx: broadcast::Receiver<Arc<RemoteBox>>,
    status_rx: watch::Receiver<PushStatus>,
    cancel: CancellationToken,
}

impl PushHandle {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously. Must be called
    /// from within a tokio runtime.
    pub fn connect(config: PushConfig, cancel: CancellationToken) -> Result<Self, Error> {
        let ws_url = config.socket_url()?;
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(PushStatus::Disconnected);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            push_loop(ws_url, config, event_tx, status_tx, task_cancel).await;
        });

        Ok(Self {
            event_rx,
            status_rx,
            cancel,
        })
    }

    /// Get a new receiver for pushed box snapshots.
    ///
    /// Multiple consumers can subscribe concurrently. A consumer that falls
    /// behind receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RemoteBox>> {
        self.event_rx.resubscribe()
    }

    /// Observe the connection status.
    pub fn status(&self) -> watch::Receiver<PushStatus> {
        self.status_rx.clone()
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

async fn push_loop(
    ws_url: Url,
    config: PushConfig,
    event_tx: broadcast::Sender<Arc<RemoteBox>>,
    status_tx: watch::Sender<PushStatus>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        status_tx.send_replace(PushStatus::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &config, &event_tx, &status_tx, &cancel) => result,
        };
        status_tx.send_replace(PushStatus::Disconnected);

        match result {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!("push channel disconnected cleanly, reconnecting");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "push channel error");

                if let Some(max) = config.reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "push reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &config.reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    status_tx.send_replace(PushStatus::Disconnected);
    tracing::debug!("push loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    Authenticate,
    Subscribe,
}

struct PendingStep {
    step: HandshakeStep,
    timer: Pin<Box<Sleep>>,
}

impl PendingStep {
    fn after(step: HandshakeStep, delay: Duration) -> Self {
        Self {
            step,
            timer: Box::pin(tokio::time::sleep(delay)),
        }
    }
}

/// Resolve when the pending handshake step is due; pend forever if none.
async fn next_step(pending: &mut Option<PendingStep>) -> HandshakeStep {
    match pending {
        Some(p) => {
            p.timer.as_mut().await;
            p.step
        }
        None => std::future::pending().await,
    }
}

/// Resolve on the next heartbeat tick; pend forever before the open packet.
async fn heartbeat(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Establish one WebSocket connection and drive it until it drops.
async fn connect_and_read(
    url: &Url,
    config: &PushConfig,
    event_tx: &broadcast::Sender<Arc<RemoteBox>>,
    status_tx: &watch::Sender<PushStatus>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to push channel");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::debug!("push WebSocket open");

    let (mut write, mut read) = ws_stream.split();
    let mut ping: Option<Interval> = None;
    let mut pending: Option<PendingStep> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::text(DISCONNECT.to_owned())).await;
                return Ok(());
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (u16::from(cf.code), cf.reason.as_str().to_owned()))
                            .unwrap_or((1005, String::new()));
                        return Err(Error::WebSocketClosed { code, reason });
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(());
                    }
                    // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    Some(Ok(_)) => continue,
                };

                match parse_packet(&text) {
                    Packet::Open { ping_interval } => {
                        tracing::debug!(?ping_interval, "engine.io open");
                        ping = ping_interval.map(|period| {
                            let mut i = tokio::time::interval_at(
                                tokio::time::Instant::now() + period,
                                period,
                            );
                            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            i
                        });
                    }
                    Packet::Ping => send(&mut write, PONG).await?,
                    Packet::Pong => tracing::trace!("engine.io pong"),
                    Packet::Connect => {
                        tracing::info!("push channel connected");
                        status_tx.send_replace(PushStatus::Connected);
                        pending = Some(PendingStep::after(
                            HandshakeStep::Authenticate,
                            config.auth_delay,
                        ));
                    }
                    Packet::Disconnect => {
                        return Err(Error::WebSocketClosed {
                            code: 1000,
                            reason: "namespace disconnected by server".into(),
                        });
                    }
                    Packet::Event { name, args } => handle_event(&name, &args, event_tx),
                    Packet::Close => return Ok(()),
                    Packet::Other => tracing::trace!(frame = text.as_str(), "ignoring push frame"),
                }
            }
            () = heartbeat(&mut ping) => send(&mut write, PING).await?,
            step = next_step(&mut pending) => match step {
                HandshakeStep::Authenticate => {
                    tracing::debug!("authenticating push channel");
                    send(&mut write, &emit("authenticate", config.token.expose_secret())).await?;
                    pending = Some(PendingStep::after(
                        HandshakeStep::Subscribe,
                        config.subscribe_delay,
                    ));
                }
                HandshakeStep::Subscribe => {
                    tracing::info!(topic = %config.topic, "subscribing to push updates");
                    send(&mut write, &emit("subscribe", &config.topic)).await?;
                    pending = None;
                    status_tx.send_replace(PushStatus::Subscribed);
                }
            },
        }
    }
}

async fn send<S>(write: &mut S, frame: &str) -> Result<(), Error>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    write
        .send(Message::text(frame.to_owned()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

// ── Framing ──────────────────────────────────────────────────────────

const PING: &str = "2";
const PONG: &str = "3";
const DISCONNECT: &str = "41";

/// A decoded Engine.IO / Socket.IO text frame.
#[derive(Debug, PartialEq)]
enum Packet {
    Open { ping_interval: Option<Duration> },
    Close,
    Ping,
    Pong,
    Connect,
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Other,
}

fn parse_packet(text: &str) -> Packet {
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => {
            let ping_interval = serde_json::from_str::<Value>(chars.as_str())
                .ok()
                .and_then(|v| v.get("pingInterval").and_then(Value::as_u64))
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis);
            Packet::Open { ping_interval }
        }
        Some('1') => Packet::Close,
        Some('2') => Packet::Ping,
        Some('3') => Packet::Pong,
        Some('4') => parse_socket_packet(chars.as_str()),
        _ => Packet::Other,
    }
}

fn parse_socket_packet(body: &str) -> Packet {
    let mut chars = body.chars();
    match chars.next() {
        Some('0') => Packet::Connect,
        Some('1') => Packet::Disconnect,
        Some('2') => {
            // An optional ack id precedes the JSON array.
            let payload = chars.as_str().trim_start_matches(|c: char| c.is_ascii_digit());
            match serde_json::from_str::<Vec<Value>>(payload) {
                Ok(mut parts) if !parts.is_empty() => match parts.remove(0) {
                    Value::String(name) => Packet::Event { name, args: parts },
                    _ => Packet::Other,
                },
                _ => Packet::Other,
            }
        }
        _ => Packet::Other,
    }
}

/// Encode a socket.io event with one string argument.
fn emit(event: &str, arg: &str) -> String {
    format!("42{}", Value::from(vec![Value::from(event), Value::from(arg)]))
}

// ── Event decoding ───────────────────────────────────────────────────

fn handle_event(name: &str, args: &[Value], event_tx: &broadcast::Sender<Arc<RemoteBox>>) {
    if name != STATE_EVENT {
        tracing::trace!(event = name, "ignoring push event");
        return;
    }

    let Some(data) = args
        .first()
        .and_then(|payload| payload.get("data"))
        .filter(|data| !data.is_null())
    else {
        tracing::trace!("push event without data, dropping");
        return;
    };

    match serde_json::from_value::<RemoteBox>(data.clone()) {
        Ok(remote) => {
            tracing::debug!(device_key = remote.device_key, "push update received");
            // No subscribers right now is fine.
            let _ = event_tx.send(Arc::new(remote));
        }
        Err(e) => tracing::debug!(error = %e, "push data is not a box, dropping"),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
