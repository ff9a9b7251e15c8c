// ── Update synthesis ──
//
// The API only accepts whole-box updates for capsule slots. These helpers
// merge a single-field intent with the mirror's true values.

use moodo_api::{BoxStatus, BoxUpdate, SlotUpdate};

use crate::model::{DeviceState, MAX_LEVEL, SLOT_COUNT};

/// Speed used when a slot is activated while its stored speed is zero.
pub const DEFAULT_SLOT_SPEED: u8 = 100;

/// A single-field change to one capsule slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    SetSlotActive { slot: usize, active: bool },
    SetSlotSpeed { slot: usize, speed: u8 },
}

impl FieldChange {
    pub fn slot(self) -> usize {
        match self {
            Self::SetSlotActive { slot, .. } | Self::SetSlotSpeed { slot, .. } => slot,
        }
    }

    /// The `(active, speed)` the target slot ends up with, given its true values.
    pub fn resolve(self, current: SlotUpdate) -> SlotUpdate {
        match self {
            Self::SetSlotActive { active: true, .. } => SlotUpdate {
                fan_active: true,
                fan_speed: if current.fan_speed == 0 {
                    DEFAULT_SLOT_SPEED
                } else {
                    current.fan_speed
                },
            },
            Self::SetSlotActive { active: false, .. } | Self::SetSlotSpeed { speed: 0, .. } => {
                SlotUpdate {
                    fan_active: false,
                    fan_speed: current.fan_speed,
                }
            }
            Self::SetSlotSpeed { speed, .. } => SlotUpdate {
                fan_active: true,
                fan_speed: speed.min(MAX_LEVEL),
            },
        }
    }
}

/// Build the full update for `change` from the current mirror entry.
///
/// Power, intensity and every untouched slot come from `state` unchanged.
/// A slot index outside `0..4` leaves all slots as they are. The request
/// id is left empty for the caller to stamp.
pub fn build_update(state: &DeviceState, change: FieldChange) -> BoxUpdate {
    let mut slots: [SlotUpdate; SLOT_COUNT] = state.slots.clone().map(|slot| SlotUpdate {
        fan_speed: slot.speed.min(MAX_LEVEL),
        fan_active: slot.active,
    });

    if let Some(target) = slots.get_mut(change.slot()) {
        *target = change.resolve(*target);
    }

    let [slot0, slot1, slot2, slot3] = slots;
    BoxUpdate {
        device_key: state.key.get(),
        fan_volume: state.intensity.min(MAX_LEVEL),
        box_status: BoxStatus::from(state.powered),
        settings_slot0: slot0,
        settings_slot1: slot1,
        settings_slot2: slot2,
        settings_slot3: slot3,
        restful_request_id: None,
    }
}

/// Apply a successfully written update to the local entry.
///
/// Capsule labels are not part of an update and stay untouched.
pub fn apply_update(state: &mut DeviceState, update: &BoxUpdate) {
    state.powered = update.box_status.is_on();
    state.intensity = update.fan_volume.min(MAX_LEVEL);
    for (slot, written) in state.slots.iter_mut().zip(update.slots()) {
        slot.active = written.fan_active;
        slot.speed = written.fan_speed.min(MAX_LEVEL);
    }
}
