// Wire models for the Moodo REST API and push events.
//
// Field names follow the JSON the service sends. Numeric fields are kept
// wide (`u32`) on the wire; the core crate clamps them into 0..=100.

use serde::{Deserialize, Serialize};

/// Power state of a box as encoded by the API (`0` = off, `1` = on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BoxStatus {
    #[default]
    Off,
    On,
}

impl BoxStatus {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<u8> for BoxStatus {
    fn from(raw: u8) -> Self {
        if raw == 0 { Self::Off } else { Self::On }
    }
}

impl From<BoxStatus> for u8 {
    fn from(status: BoxStatus) -> Self {
        match status {
            BoxStatus::Off => 0,
            BoxStatus::On => 1,
        }
    }
}

impl From<bool> for BoxStatus {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Information about the capsule inserted into a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleInfo {
    pub title: String,
}

/// One of the four capsule slots of a box, as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSlot {
    pub slot_id: u32,
    #[serde(default)]
    pub capsule_info: Option<CapsuleInfo>,
    #[serde(default)]
    pub fan_speed: u32,
    #[serde(default)]
    pub fan_active: bool,
}

/// Full state of a single box.
///
/// Returned by `GET /boxes` and carried verbatim in push events, so both
/// channels feed the mirror with the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteBox {
    pub device_key: u64,
    #[serde(default)]
    pub fan_volume: u32,
    #[serde(default)]
    pub box_status: BoxStatus,
    #[serde(default)]
    pub settings: Vec<RemoteSlot>,
    /// Echo of the id attached to the write that caused this state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restful_request_id: Option<String>,
    /// All remaining fields the service sends (name, is_online, ...).
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Envelope of `GET /boxes`.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxesResponse {
    pub boxes: Vec<RemoteBox>,
}

/// Envelope of `GET /boxes/{key}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxResponse {
    #[serde(rename = "box")]
    pub device: RemoteBox,
}

/// Desired state of one slot inside a [`BoxUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub fan_speed: u8,
    pub fan_active: bool,
}

/// Whole-object update accepted by `POST /boxes`.
///
/// The API has no partial update for slots, so every field must be filled
/// from the current known state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxUpdate {
    pub device_key: u64,
    pub fan_volume: u8,
    pub box_status: BoxStatus,
    pub settings_slot0: SlotUpdate,
    pub settings_slot1: SlotUpdate,
    pub settings_slot2: SlotUpdate,
    pub settings_slot3: SlotUpdate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restful_request_id: Option<String>,
}

impl BoxUpdate {
    /// The four slot updates in index order.
    pub fn slots(&self) -> [SlotUpdate; 4] {
        [
            self.settings_slot0,
            self.settings_slot1,
            self.settings_slot2,
            self.settings_slot3,
        ]
    }
}

/// Body of `POST /intensity/{key}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntensityUpdate {
    pub fan_volume: u8,
}
