// ── Runtime bridge configuration ──
//
// Describes which boxes to mirror and how to reach the Moodo cloud.
// Carries the token but never touches disk: `moodo-config` (or a test)
// builds a `BridgeConfig` and hands it in.

use std::time::Duration;

use moodo_api::{DEFAULT_API_URL, DEFAULT_SOCKET_URL, RetryPolicy};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::model::DeviceKey;

/// Accessory type a box is exposed as.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceKind {
    #[default]
    Fan,
    Purifier,
}

/// One configured box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub key: DeviceKey,
    pub name: String,
    pub kind: DeviceKind,
    /// Expose one service per capsule slot.
    pub show_capsules: bool,
    /// Name capsule services after the fragrance when known.
    pub use_capsule_names: bool,
    /// Host capsule services on the main accessory.
    pub single_accessory_mode: bool,
}

impl DeviceConfig {
    pub fn new(key: DeviceKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            kind: DeviceKind::Fan,
            show_capsules: false,
            use_capsule_names: false,
            single_accessory_mode: false,
        }
    }
}

/// Everything the [`Controller`](crate::Controller) needs.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub api_url: Url,
    pub socket_url: Url,
    pub token: SecretString,
    pub devices: Vec<DeviceConfig>,
    /// Attempts and pause for every REST call.
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Connect the push channel on `start()`.
    pub push_enabled: bool,
    /// Pause before republishing a rejected slot change.
    pub revert_delay: Duration,
    pub auth_delay: Duration,
    pub subscribe_delay: Duration,
}

impl BridgeConfig {
    /// Defaults for the public Moodo cloud.
    pub fn new(token: SecretString, devices: Vec<DeviceConfig>) -> Result<Self, CoreError> {
        Ok(Self {
            api_url: parse_url(DEFAULT_API_URL)?,
            socket_url: parse_url(DEFAULT_SOCKET_URL)?,
            token,
            devices,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            push_enabled: true,
            revert_delay: Duration::from_secs(1),
            auth_delay: Duration::from_secs(1),
            subscribe_delay: Duration::from_secs(2),
        })
    }

    pub fn device(&self, key: DeviceKey) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.key == key)
    }
}

fn parse_url(raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw).map_err(|e| CoreError::Config {
        message: format!("invalid URL {raw}: {e}"),
    })
}
