// Moodo REST API client
//
// Wraps `reqwest::Client` with Moodo URL construction, status mapping and
// the retry budget every endpoint shares. The client never touches local
// state: callers decide what a successful write means for their mirror.

use std::future::Future;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{BoxResponse, BoxUpdate, BoxesResponse, IntensityUpdate, RemoteBox};
use crate::transport::TransportConfig;

/// Default REST endpoint of the Moodo cloud.
pub const DEFAULT_API_URL: &str = "https://rest.moodo.co/api";

const BODY_PREVIEW_CHARS: usize = 200;

// ── RetryPolicy ──────────────────────────────────────────────────────

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Fixed pause between two attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }

    fn attempts(self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ── MoodoClient ──────────────────────────────────────────────────────

/// HTTP client for the Moodo REST API.
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct MoodoClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl MoodoClient {
    /// Create a client that authenticates every request with `token`.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The caller is responsible for the `token` header.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            retry: RetryPolicy::default(),
        }
    }

    /// Return a clone that applies `policy` to every call.
    pub fn with_retry(&self, policy: RetryPolicy) -> Self {
        Self {
            retry: policy,
            ..self.clone()
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The active retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /boxes` -- every box on the account.
    pub async fn fetch_all(&self) -> Result<Vec<RemoteBox>, Error> {
        let url = self.api_url("boxes")?;
        let resp: BoxesResponse = self
            .retrying("fetch_all", || self.get(url.clone()))
            .await?;
        Ok(resp.boxes)
    }

    /// `GET /boxes/{key}` -- a single box.
    pub async fn fetch_box(&self, device_key: u64) -> Result<RemoteBox, Error> {
        let url = self.api_url(&format!("boxes/{device_key}"))?;
        let resp: BoxResponse = self
            .retrying("fetch_box", || self.get(url.clone()))
            .await?;
        Ok(resp.device)
    }

    /// `POST /boxes/{key}` with an empty object -- power the box on.
    pub async fn power_on(&self, device_key: u64) -> Result<(), Error> {
        let url = self.api_url(&format!("boxes/{device_key}"))?;
        let body = serde_json::json!({});
        self.retrying("power_on", || self.post(url.clone(), &body))
            .await
    }

    /// `DELETE /boxes/{key}` -- power the box off.
    pub async fn power_off(&self, device_key: u64) -> Result<(), Error> {
        let url = self.api_url(&format!("boxes/{device_key}"))?;
        self.retrying("power_off", || self.delete(url.clone()))
            .await
    }

    /// `POST /intensity/{key}` -- set the overall fan volume.
    pub async fn set_intensity(&self, device_key: u64, fan_volume: u8) -> Result<(), Error> {
        let url = self.api_url(&format!("intensity/{device_key}"))?;
        let body = IntensityUpdate { fan_volume };
        self.retrying("set_intensity", || self.post(url.clone(), &body))
            .await
    }

    /// `POST /boxes` -- replace the whole box configuration.
    pub async fn apply_update(&self, update: &BoxUpdate) -> Result<(), Error> {
        let url = self.api_url("boxes")?;
        self.retrying("apply_update", || self.post(url.clone(), update))
            .await
    }

    // ── Retry loop ───────────────────────────────────────────────────

    /// Run `attempt` until it succeeds or the budget is spent.
    ///
    /// Returns the error of the last attempt on exhaustion.
    async fn retrying<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let budget = self.retry.attempts();
        let mut n: u32 = 1;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if n >= budget => {
                    warn!(op, attempts = n, error = %e, "request failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        op,
                        attempt = n,
                        remaining = budget - n,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.retry.interval).await;
                    n += 1;
                }
            }
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let body = read_body(resp).await?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }

    async fn post(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<(), Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        read_body(resp).await.map(drop)
    }

    async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {}", url);

        let resp = self.http.delete(url).send().await.map_err(Error::Transport)?;
        read_body(resp).await.map(drop)
    }
}

/// Map the HTTP status to an error, or return the body on success.
async fn read_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body: preview(&body),
        });
    }

    Ok(body)
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_three_attempts_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval, Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_behaves_like_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            interval: Duration::ZERO,
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW_CHARS);
    }

    #[test]
    fn api_url_joins_without_double_slash() {
        let base = Url::parse("https://rest.moodo.co/api/").unwrap();
        let client = MoodoClient::with_client(reqwest::Client::new(), base);
        let url = client.api_url("boxes/7").unwrap();
        assert_eq!(url.as_str(), "https://rest.moodo.co/api/boxes/7");
    }
}
