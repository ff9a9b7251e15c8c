//! Box inspection handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use moodo_core::{AccessoryView, CapsuleHost, Controller, DeviceKey, DeviceKind, DeviceState};

use crate::cli::{BoxesArgs, BoxesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Rows ────────────────────────────────────────────────────────────

/// A mirror entry with its configured name, for structured output.
#[derive(Serialize)]
struct BoxEntry {
    name: String,
    kind: DeviceKind,
    #[serde(flatten)]
    state: Arc<DeviceState>,
}

#[derive(Tabled)]
struct BoxRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Intensity")]
    intensity: String,
    #[tabled(rename = "Capsules")]
    capsules: String,
}

impl BoxRow {
    fn new(entry: &BoxEntry, color: bool) -> Self {
        let state = &entry.state;
        Self {
            key: state.key.to_string(),
            name: entry.name.clone(),
            kind: entry.kind.to_string(),
            status: output::sync_label(state.is_synced(), color),
            power: output::power_label(state.powered, color),
            intensity: format!("{}%", state.intensity),
            capsules: capsule_summary(state),
        }
    }
}

/// Active capsules as consumers see them, e.g. `1:40% 3:60%`.
pub fn capsule_summary(state: &DeviceState) -> String {
    let active: Vec<String> = state
        .observed()
        .slots
        .iter()
        .zip(1..)
        .filter(|(slot, _)| slot.active)
        .map(|(slot, index)| format!("{index}:{}%", slot.speed))
        .collect();

    if active.is_empty() {
        "-".into()
    } else {
        active.join(" ")
    }
}

fn detail(entry: &BoxEntry) -> String {
    let state = &entry.state;
    let mut lines = vec![
        format!("Key:       {}", state.key),
        format!("Name:      {}", entry.name),
        format!("Type:      {}", entry.kind),
        format!("Status:    {}", state.sync),
        format!("Power:     {}", if state.powered { "on" } else { "off" }),
        format!("Intensity: {}%", state.intensity),
        format!(
            "Updated:   {}",
            output::local_time(state.updated_at, "%Y-%m-%d %H:%M:%S %:z", "-")
        ),
        format!(
            "Source:    {}",
            state.source.map_or_else(|| "-".into(), |s| s.to_string())
        ),
    ];

    for (slot, index) in state.slots.iter().zip(1..) {
        let mut line = format!(
            "Capsule {index}: {} {}%",
            if slot.active { "on " } else { "off" },
            slot.speed
        );
        if let Some(ref label) = slot.label {
            line.push_str(&format!(" ({label})"));
        }
        lines.push(line);
    }
    if !state.powered {
        lines.push("(capsule values are stored; the box is off)".into());
    }
    lines.join("\n")
}

fn accessory_detail(view: &AccessoryView) -> String {
    let mut lines = vec![
        format!("Serial:   {}", view.serial_number),
        format!("Type:     {}", view.kind),
        format!(
            "Main:     {} ({}, speed {})",
            view.main.name,
            if view.main.active { "active" } else { "inactive" },
            view.main.rotation_speed
        ),
    ];
    if let Some(state) = view.main.current_state {
        lines.push(format!("State:    {state}"));
    }
    match view.capsule_host {
        Some(CapsuleHost::Main) => lines.push("Capsules: on main accessory".into()),
        Some(CapsuleHost::Separate { ref accessory_name }) => {
            lines.push(format!("Capsules: on \"{accessory_name}\""));
        }
        None => lines.push("Capsules: hidden".into()),
    }
    for capsule in &view.capsules {
        lines.push(format!(
            "  {} ({}, speed {})",
            capsule.name,
            if capsule.active { "active" } else { "inactive" },
            capsule.rotation_speed
        ));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: BoxesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::bridge_config(global)?;
    let color = output::should_color(global.color);

    let entry_for = {
        let config = config.clone();
        move |state: Arc<DeviceState>| BoxEntry {
            name: util::device_name(&config, state.key),
            kind: config.device(state.key).map(|d| d.kind).unwrap_or_default(),
            state,
        }
    };

    match args.command {
        BoxesCommand::List => {
            let snapshot =
                Controller::oneshot(config, |ctrl| async move { Ok(ctrl.devices_snapshot()) })
                    .await?;
            let entries: Vec<BoxEntry> = snapshot.into_iter().map(&entry_for).collect();

            let out = output::render_list(
                global.output,
                &entries,
                |e| BoxRow::new(e, color),
                |e| e.state.key.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BoxesCommand::Get { key } => {
            let key = DeviceKey::new(key);
            let state = Controller::oneshot(config, |ctrl| async move {
                util::ensure_synced(&ctrl, key).await
            })
            .await?;

            let out = output::render_single(global.output, &entry_for(state), detail, |e| {
                e.state.key.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BoxesCommand::Accessory { key } => {
            let key = DeviceKey::new(key);
            let view = Controller::oneshot(config, |ctrl| async move {
                util::ensure_synced(&ctrl, key).await?;
                ctrl.accessory(key)
                    .ok_or(moodo_core::CoreError::DeviceNotFound { key })
            })
            .await?;

            let out = output::render_single(global.output, &view, accessory_detail, |v| {
                v.serial_number.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
