//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};

use moodo_config::{Config, DeviceEntry, RawDeviceId};
use moodo_core::DeviceKey;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Helpers ─────────────────────────────────────────────────────────

const REDACTED: &str = "****";

fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    if cfg.token.is_some() {
        cfg.token = Some(REDACTED.into());
    }
    cfg
}

/// Format config for display. Expects an already redacted config.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref token) = cfg.token {
        let _ = writeln!(out, "token = \"{token}\"");
    }
    if let Some(ref env) = cfg.token_env {
        let _ = writeln!(out, "token_env = \"{env}\"");
    }
    let _ = writeln!(out, "api_url = \"{}\"", cfg.api_url);
    let _ = writeln!(out, "socket_url = \"{}\"", cfg.socket_url);
    let _ = writeln!(out, "max_api_retry = {}", cfg.max_api_retry);
    let _ = writeln!(out, "api_retry_interval_ms = {}", cfg.api_retry_interval_ms);
    let _ = writeln!(out, "timeout = {}", cfg.timeout);
    let _ = writeln!(out, "push = {}", cfg.push);
    let _ = writeln!(out, "revert_delay_ms = {}", cfg.revert_delay_ms);

    for device in cfg.device_configs() {
        let _ = writeln!(out);
        let _ = writeln!(out, "[[devices]]");
        let _ = writeln!(out, "id = {}", device.key);
        let _ = writeln!(out, "name = \"{}\"", device.name);
        let _ = writeln!(out, "type = \"{}\"", device.kind);
        let _ = writeln!(out, "show_capsules = {}", device.show_capsules);
        let _ = writeln!(out, "use_capsule_names = {}", device.use_capsule_names);
        let _ = writeln!(out, "single_accessory_mode = {}", device.single_accessory_mode);
    }

    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Offer keyring storage for the token.
///
/// Returns `Some(token)` if the user chose plaintext, `None` if stored in keyring.
fn prompt_token_storage(token: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        moodo_config::store_token(token).map_err(|e| CliError::Validation {
            field: "keyring".into(),
            reason: format!("failed to store token in keyring: {e}"),
        })?;
        eprintln!("   ✓ Token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token.to_owned()))
    }
}

fn prompt_device() -> Result<DeviceEntry, CliError> {
    let key: String = Input::new()
        .with_prompt("Device key")
        .validate_with(|input: &String| {
            input
                .parse::<DeviceKey>()
                .map(|_| ())
                .map_err(|_| "device key must be a number")
        })
        .interact_text()
        .map_err(prompt_err)?;
    let key = key.parse::<DeviceKey>().map_err(|e| CliError::Validation {
        field: "id".into(),
        reason: e.to_string(),
    })?;

    let name: String = Input::new()
        .with_prompt("Name")
        .interact_text()
        .map_err(prompt_err)?;

    let kinds = &["fan", "purifier"];
    let kind = Select::new()
        .with_prompt("Expose as")
        .items(kinds)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let show_capsules = Confirm::new()
        .with_prompt("Show capsules?")
        .default(false)
        .interact()
        .map_err(prompt_err)?;

    Ok(DeviceEntry {
        id: Some(RawDeviceId::Number(key.get())),
        name: Some(name),
        kind: kinds.get(kind).map(|k| (*k).to_owned()),
        show_capsules,
        ..DeviceEntry::default()
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let path = util::config_path(global);
            eprintln!("Moodo CLI configuration wizard");
            eprintln!("   Config path: {}\n", path.display());

            let token = rpassword::prompt_password("Moodo token: ").map_err(prompt_err)?;
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            let token = prompt_token_storage(token.trim())?;

            let mut devices = Vec::new();
            loop {
                devices.push(prompt_device()?);
                let more = Confirm::new()
                    .with_prompt("Add another box?")
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?;
                if !more {
                    break;
                }
            }

            let cfg = Config {
                token,
                devices,
                ..Config::default()
            };
            moodo_config::save_config_to(&cfg, &path)?;

            eprintln!("\n✓ Configuration written to {}", path.display());
            eprintln!("  Test it: moodo boxes list");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&util::load_config(global)?);
            let out = output::render_single(global.output, &cfg, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", util::config_path(global).display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_token() {
        let cfg = Config {
            token: Some("very-secret".into()),
            ..Config::default()
        };
        let text = format_config(&redacted(&cfg));
        assert!(text.contains("token = \"****\""));
        assert!(!text.contains("very-secret"));
    }
}
