//! Configuration for moodo-bridge.
//!
//! TOML file + `MOODO_` environment, token resolution (env var, keyring,
//! plaintext), per-device validation, and translation to
//! `moodo_core::BridgeConfig`. The CLI layers its flag overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use moodo_api::{DEFAULT_API_URL, DEFAULT_SOCKET_URL, RetryPolicy};
use moodo_core::{BridgeConfig, DeviceConfig, DeviceKey, DeviceKind};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Keyring service name for the account token.
pub const KEYRING_SERVICE: &str = "moodo";
const KEYRING_TOKEN_ENTRY: &str = "token";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no Moodo token configured")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Account token (plaintext; prefer the keyring or `token_env`).
    pub token: Option<String>,

    /// Environment variable holding the token.
    pub token_env: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_socket_url")]
    pub socket_url: String,

    /// Total attempts per REST call.
    #[serde(default = "default_max_api_retry")]
    pub max_api_retry: u32,

    #[serde(default = "default_api_retry_interval_ms")]
    pub api_retry_interval_ms: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connect the push channel for long-running commands.
    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default = "default_revert_delay_ms")]
    pub revert_delay_ms: u64,

    /// CLI output defaults.
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            token_env: None,
            api_url: default_api_url(),
            socket_url: default_socket_url(),
            max_api_retry: default_max_api_retry(),
            api_retry_interval_ms: default_api_retry_interval_ms(),
            timeout: default_timeout(),
            push: true,
            revert_delay_ms: default_revert_delay_ms(),
            defaults: Defaults::default(),
            devices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.into()
}
fn default_max_api_retry() -> u32 {
    3
}
fn default_api_retry_interval_ms() -> u64 {
    2000
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_revert_delay_ms() -> u64 {
    1000
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// Device key as written by users: TOML integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDeviceId {
    Number(u64),
    Text(String),
}

/// One `[[devices]]` entry, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub id: Option<RawDeviceId>,
    pub name: Option<String>,
    /// `fan` or `purifier`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub show_capsules: bool,
    #[serde(default)]
    pub use_capsule_names: bool,
    #[serde(default)]
    pub single_accessory_mode: bool,
}

impl DeviceEntry {
    /// Validate the entry. Problems are logged; `None` means skip it.
    pub fn validate(&self, index: usize) -> Option<DeviceConfig> {
        let key = match &self.id {
            Some(RawDeviceId::Number(n)) => DeviceKey::new(*n),
            Some(RawDeviceId::Text(s)) => match s.parse::<DeviceKey>() {
                Ok(key) => key,
                Err(e) => {
                    warn!(index, id = %s, error = %e, "device id is not numeric, skipping");
                    return None;
                }
            },
            None => {
                warn!(index, "device entry has no id, skipping");
                return None;
            }
        };

        let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            warn!(index, device_key = %key, "device entry has no name, skipping");
            return None;
        };

        let kind = match self.kind.as_deref() {
            None => DeviceKind::Fan,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(device_key = %key, kind = raw, "unknown device type, using fan");
                DeviceKind::Fan
            }),
        };

        Some(DeviceConfig {
            key,
            name: name.to_owned(),
            kind,
            show_capsules: self.show_capsules,
            use_capsule_names: self.use_capsule_names,
            single_accessory_mode: self.single_accessory_mode,
        })
    }
}

impl Config {
    /// Validated device list. Invalid entries are skipped with a warning.
    pub fn device_configs(&self) -> Vec<DeviceConfig> {
        self.devices
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.validate(i))
            .collect()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("co", "moodo", "moodo-bridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("moodo-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources: defaults, then the TOML file, then `MOODO_*` variables.
///
/// Nested keys use a double underscore (`MOODO_DEFAULTS__OUTPUT`).
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MOODO_").split("__"))
}

/// Load the config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the account token: `token_env`, then the keyring, then plaintext.
pub fn resolve_token(cfg: &Config) -> Result<SecretString, ConfigError> {
    resolve_token_from(cfg, |name| std::env::var(name).ok(), keyring_token)
}

fn resolve_token_from(
    cfg: &Config,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(token) = cfg.token_env.as_deref().and_then(env) {
        return Ok(SecretString::from(token));
    }

    // 2. System keyring
    if let Some(token) = keyring() {
        return Ok(SecretString::from(token));
    }

    // 3. Plaintext in config
    cfg.token
        .as_ref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| SecretString::from(t.clone()))
        .ok_or(ConfigError::NoCredentials)
}

fn keyring_token() -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_ENTRY)
        .and_then(|entry| entry.get_password())
        .ok()
}

/// Store the token in the system keyring.
pub fn store_token(token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_ENTRY)?.set_password(token)?;
    Ok(())
}

// ── BridgeConfig translation ────────────────────────────────────────

/// Build a `BridgeConfig` with an already resolved token.
pub fn to_bridge_config(cfg: &Config, token: SecretString) -> Result<BridgeConfig, ConfigError> {
    let mut bridge = BridgeConfig::new(token, cfg.device_configs()).map_err(|e| {
        ConfigError::Validation {
            field: "defaults".into(),
            reason: e.to_string(),
        }
    })?;

    bridge.api_url = parse_url("api_url", &cfg.api_url)?;
    bridge.socket_url = parse_url("socket_url", &cfg.socket_url)?;
    bridge.retry = RetryPolicy {
        max_attempts: cfg.max_api_retry,
        interval: Duration::from_millis(cfg.api_retry_interval_ms),
    };
    bridge.timeout = Duration::from_secs(cfg.timeout);
    bridge.push_enabled = cfg.push;
    bridge.revert_delay = Duration::from_millis(cfg.revert_delay_ms);
    Ok(bridge)
}

/// Build a `BridgeConfig`, resolving the token from the config's chain.
pub fn bridge_config(cfg: &Config) -> Result<BridgeConfig, ConfigError> {
    let token = resolve_token(cfg)?;
    to_bridge_config(cfg, token)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}
