// ── Accessory projection ──
//
// Computes what a home-automation accessory for a box would show. The
// accessory framework itself is external; consumers render these views.

use serde::Serialize;

use crate::config::{DeviceConfig, DeviceKind};
use crate::model::{DeviceState, ObservedSlot};

/// Air purifier "current state" values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurifierState {
    Inactive = 0,
    PurifyingAir = 2,
}

impl PurifierState {
    fn from_active(active: bool) -> Self {
        if active {
            Self::PurifyingAir
        } else {
            Self::Inactive
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::PurifyingAir => 2,
        }
    }
}

/// Purifier target state. Boxes only support manual mode.
pub const TARGET_STATE_MANUAL: u8 = 0;

/// One fan / purifier service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub active: bool,
    pub rotation_speed: u8,
    /// `1..=4` for capsule services, `None` for the main service.
    pub label_index: Option<u8>,
    /// Purifiers only.
    pub current_state: Option<PurifierState>,
    /// Purifiers only; always manual.
    pub target_state: Option<u8>,
}

/// Where the capsule services live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CapsuleHost {
    /// Capsules are services on the main accessory.
    Main,
    /// Capsules live on a separate accessory with this name.
    Separate { accessory_name: String },
}

/// Full projection for one configured box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryView {
    pub serial_number: String,
    pub kind: DeviceKind,
    pub main: ServiceView,
    pub capsule_host: Option<CapsuleHost>,
    pub capsules: Vec<ServiceView>,
}

impl AccessoryView {
    /// Project `state` through the accessory options of `device`.
    pub fn project(device: &DeviceConfig, state: &DeviceState) -> Self {
        let observed = state.observed();
        let purifier = device.kind == DeviceKind::Purifier;

        let main = ServiceView {
            name: device.name.clone(),
            active: observed.powered,
            rotation_speed: observed.intensity,
            label_index: None,
            current_state: purifier.then(|| PurifierState::from_active(observed.powered)),
            target_state: purifier.then_some(TARGET_STATE_MANUAL),
        };

        let (capsule_host, capsules) = if device.show_capsules {
            let host = if device.single_accessory_mode {
                CapsuleHost::Main
            } else {
                CapsuleHost::Separate {
                    accessory_name: format!("{} Capsules", device.name),
                }
            };
            let capsules = observed
                .slots
                .iter()
                .zip(1u8..)
                .map(|(slot, index)| capsule_service(device, slot, index, purifier))
                .collect();
            (Some(host), capsules)
        } else {
            (None, Vec::new())
        };

        Self {
            serial_number: device.key.to_string(),
            kind: device.kind,
            main,
            capsule_host,
            capsules,
        }
    }
}

fn capsule_service(device: &DeviceConfig, slot: &ObservedSlot, index: u8, purifier: bool) -> ServiceView {
    let name = match (&slot.label, device.use_capsule_names) {
        (Some(title), true) => title.clone(),
        _ => format!("Capsule {index}"),
    };

    ServiceView {
        name,
        active: slot.active,
        rotation_speed: slot.speed,
        label_index: Some(index),
        current_state: purifier.then(|| PurifierState::from_active(slot.active)),
        target_state: purifier.then_some(TARGET_STATE_MANUAL),
    }
}
