use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use moodo_api::RemoteBox;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of capsule slots every box has.
pub const SLOT_COUNT: usize = 4;

/// Upper bound of every intensity / speed value.
pub const MAX_LEVEL: u8 = 100;

// ── DeviceKey ────────────────────────────────────────────────────────

/// Opaque numeric identifier of a box (`device_key` in the API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(u64);

impl DeviceKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for DeviceKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// ── Sync metadata ────────────────────────────────────────────────────

/// Whether the entry has ever been filled from the remote side.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    #[default]
    Uninitialized,
    Synced,
}

/// Which path last wrote a mirror entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateSource {
    /// REST fetch (startup or explicit refresh).
    Fetch,
    /// Push channel event.
    Push,
    /// Optimistic update after a successful local write.
    Local,
}

// ── SlotState ────────────────────────────────────────────────────────

/// True remote state of one capsule slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    pub active: bool,
    pub speed: u8,
    /// Capsule title, when the box reports one.
    pub label: Option<String>,
}

// ── DeviceState ──────────────────────────────────────────────────────

/// Mirror entry for a single box.
///
/// Slot values are always the *true* remote values, even while the box is
/// powered off. Use [`observed`](Self::observed) for what a consumer
/// should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub key: DeviceKey,
    pub sync: SyncState,
    pub powered: bool,
    pub intensity: u8,
    pub slots: [SlotState; SLOT_COUNT],
    pub updated_at: Option<DateTime<Utc>>,
    pub source: Option<UpdateSource>,
}

impl DeviceState {
    /// A fresh, all-zero entry awaiting its first snapshot.
    pub fn new(key: DeviceKey) -> Self {
        Self {
            key,
            sync: SyncState::Uninitialized,
            powered: false,
            intensity: 0,
            slots: Default::default(),
            updated_at: None,
            source: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync == SyncState::Synced
    }

    pub fn slot(&self, index: usize) -> Option<&SlotState> {
        self.slots.get(index)
    }

    /// Externally visible projection: slots read as off while powered off.
    pub fn observed(&self) -> ObservedState {
        let slots = self.slots.clone().map(|slot| ObservedSlot {
            active: self.powered && slot.active,
            speed: if self.powered { slot.speed } else { 0 },
            label: slot.label,
        });

        ObservedState {
            key: self.key,
            powered: self.powered,
            intensity: self.intensity,
            slots,
        }
    }

    /// Overwrite power, intensity and every slot from a remote snapshot.
    ///
    /// Slots the snapshot does not mention are reset to their defaults.
    pub(crate) fn apply_remote(&mut self, remote: &RemoteBox) {
        self.powered = remote.box_status.is_on();
        self.intensity = clamp_level(remote.fan_volume);

        let mut slots: [SlotState; SLOT_COUNT] = Default::default();
        for setting in &remote.settings {
            let Some(slot) = usize::try_from(setting.slot_id)
                .ok()
                .and_then(|index| slots.get_mut(index))
            else {
                debug!(
                    device_key = %self.key,
                    slot_id = setting.slot_id,
                    "ignoring out-of-range slot"
                );
                continue;
            };

            *slot = SlotState {
                active: setting.fan_active,
                speed: clamp_level(setting.fan_speed),
                label: setting.capsule_info.as_ref().map(|c| c.title.clone()),
            };
        }

        self.slots = slots;
        self.sync = SyncState::Synced;
    }
}

/// Clamp a wire value into `0..=MAX_LEVEL`.
pub(crate) fn clamp_level(raw: u32) -> u8 {
    u8::try_from(raw.min(u32::from(MAX_LEVEL))).unwrap_or(MAX_LEVEL)
}

// ── Observed projection ──────────────────────────────────────────────

/// What a consumer sees for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservedSlot {
    pub active: bool,
    pub speed: u8,
    pub label: Option<String>,
}

/// What a consumer sees for a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedState {
    pub key: DeviceKey,
    pub powered: bool,
    pub intensity: u8,
    pub slots: [ObservedSlot; SLOT_COUNT],
}
