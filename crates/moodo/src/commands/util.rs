//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use moodo_config::Config;
use moodo_core::{BridgeConfig, Controller, CoreError, DeviceKey, DeviceState};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config path in effect: `--config` / `MOODO_CONFIG`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(moodo_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(moodo_config::load_config_from(&config_path(global))?)
}

/// Build a `BridgeConfig` from the config file plus CLI overrides.
///
/// The `--token` flag wins over the config's token chain.
pub fn bridge_config(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let cfg = load_config(global)?;

    if cfg.device_configs().is_empty() {
        return Err(CliError::NoDevices {
            path: config_path(global).display().to_string(),
        });
    }

    let token = match global.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => SecretString::from(token.to_owned()),
        None => moodo_config::resolve_token(&cfg)?,
    };

    Ok(moodo_config::to_bridge_config(&cfg, token)?)
}

/// Make sure `key` has real state before acting on it.
///
/// A box missing from the startup snapshot is fetched on its own so the
/// actual API failure surfaces instead of a command against zeroed state.
pub async fn ensure_synced(
    controller: &Controller,
    key: DeviceKey,
) -> Result<Arc<DeviceState>, CoreError> {
    match controller.device(key) {
        Some(state) if state.is_synced() => Ok(state),
        Some(_) => controller.refresh_device(key).await,
        None => Err(CoreError::DeviceNotFound { key }),
    }
}

/// Configured display name for a box, or its key.
pub fn device_name(config: &BridgeConfig, key: DeviceKey) -> String {
    config
        .device(key)
        .map_or_else(|| key.to_string(), |d| d.name.clone())
}
