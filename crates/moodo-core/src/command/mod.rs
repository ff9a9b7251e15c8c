// ── Command API ──
//
// All writes flow through a single `Command` enum. The controller checks
// each one against the mirror and routes it to the matching endpoint.

use crate::error::CoreError;
use crate::model::DeviceKey;
use crate::synth::FieldChange;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// User intents against a single box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetPower { key: DeviceKey, on: bool },
    /// `0` powers the box off.
    SetIntensity { key: DeviceKey, value: u8 },
    SetSlotActive { key: DeviceKey, slot: usize, active: bool },
    SetSlotSpeed { key: DeviceKey, slot: usize, speed: u8 },
}

impl Command {
    pub fn key(self) -> DeviceKey {
        match self {
            Self::SetPower { key, .. }
            | Self::SetIntensity { key, .. }
            | Self::SetSlotActive { key, .. }
            | Self::SetSlotSpeed { key, .. } => key,
        }
    }

    /// The slot-level change this command carries, if it targets a capsule.
    pub fn field_change(self) -> Option<FieldChange> {
        match self {
            Self::SetSlotActive { slot, active, .. } => {
                Some(FieldChange::SetSlotActive { slot, active })
            }
            Self::SetSlotSpeed { slot, speed, .. } => Some(FieldChange::SetSlotSpeed { slot, speed }),
            Self::SetPower { .. } | Self::SetIntensity { .. } => None,
        }
    }
}

/// Outcome of a command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// A write was issued and the mirror updated.
    Applied,
    /// The mirror already matched; nothing was sent.
    Unchanged,
}
