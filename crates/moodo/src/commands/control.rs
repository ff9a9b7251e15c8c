//! Power, intensity and capsule handlers.
//!
//! Every write goes through `Controller::execute`, so unchanged values are
//! reported without touching the API.

use std::sync::Arc;

use moodo_core::{Command as CoreCommand, CommandResult, Controller, DeviceKey, DeviceState};

use crate::cli::{GlobalOpts, OutputFormat, PowerState, SlotArgs};
use crate::error::CliError;
use crate::output;

use super::{boxes, util};

pub async fn power(key: u64, state: PowerState, global: &GlobalOpts) -> Result<(), CliError> {
    let key = DeviceKey::new(key);
    let on = state == PowerState::On;
    let label = if on { "on" } else { "off" };

    let (result, state) = run(global, CoreCommand::SetPower { key, on }).await?;
    report(global, result, &state, &format!("powered {label}"), &format!("already {label}"))
}

pub async fn intensity(key: u64, value: u8, global: &GlobalOpts) -> Result<(), CliError> {
    let key = DeviceKey::new(key);

    let (result, state) = run(global, CoreCommand::SetIntensity { key, value }).await?;
    let applied = if value == 0 {
        "powered off (intensity 0)".to_owned()
    } else {
        format!("intensity set to {value}%")
    };
    report(global, result, &state, &applied, &format!("intensity already {value}%"))
}

pub async fn slot(args: SlotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let key = DeviceKey::new(args.key);
    let slot = usize::from(args.slot.saturating_sub(1));

    let (command, applied, unchanged) = match (args.active, args.speed) {
        (_, Some(speed)) => (
            CoreCommand::SetSlotSpeed { key, slot, speed },
            format!("capsule {} speed set to {speed}%", args.slot),
            format!("capsule {} already at {speed}%", args.slot),
        ),
        (Some(active), None) => {
            let on = active == PowerState::On;
            let label = if on { "on" } else { "off" };
            (
                CoreCommand::SetSlotActive {
                    key,
                    slot,
                    active: on,
                },
                format!("capsule {} turned {label}", args.slot),
                format!("capsule {} already {label}", args.slot),
            )
        }
        (None, None) => {
            return Err(CliError::Validation {
                field: "slot".into(),
                reason: "pass --active or --speed".into(),
            });
        }
    };

    let (result, state) = run(global, command).await?;
    report(global, result, &state, &applied, &unchanged)
}

/// Run one command through a short-lived controller.
async fn run(
    global: &GlobalOpts,
    command: CoreCommand,
) -> Result<(CommandResult, Arc<DeviceState>), CliError> {
    let config = util::bridge_config(global)?;
    let key = command.key();

    let outcome = Controller::oneshot(config, |ctrl| async move {
        util::ensure_synced(&ctrl, key).await?;
        let result = ctrl.execute(command).await?;
        let state = ctrl
            .device(key)
            .ok_or(moodo_core::CoreError::DeviceNotFound { key })?;
        Ok((result, state))
    })
    .await?;

    tracing::debug!(device_key = %key, result = ?outcome.0, "command finished");
    Ok(outcome)
}

fn report(
    global: &GlobalOpts,
    result: CommandResult,
    state: &Arc<DeviceState>,
    applied: &str,
    unchanged: &str,
) -> Result<(), CliError> {
    if global.output == OutputFormat::Table {
        if !global.quiet {
            let message = match result {
                CommandResult::Applied => format!("✓ Box {}: {applied}", state.key),
                CommandResult::Unchanged => format!("Box {}: {unchanged}", state.key),
            };
            eprintln!("{message}");
            eprintln!(
                "  power {}, intensity {}%, capsules {}",
                output::power_label(state.powered, output::should_color(global.color)),
                state.intensity,
                boxes::capsule_summary(state)
            );
        }
        return Ok(());
    }

    let out = output::render_single(global.output, state, |_| String::new(), |s| {
        s.key.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
