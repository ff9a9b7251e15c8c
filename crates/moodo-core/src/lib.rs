//! State reconciliation between Moodo boxes and a local accessory view.
//!
//! - **[`Controller`]**: Central coordinator. [`start()`](Controller::start)
//!   fetches the initial snapshot, spawns the command processor and, when
//!   enabled, the push bridge. [`Controller::oneshot()`] runs a single
//!   request-response cycle for CLI use.
//!
//! - **[`DeviceStore`]**: The device mirror: `DashMap` of `watch` channels,
//!   one per configured box, holding true remote values.
//!
//! - **[`DeviceStream`]**: Subscription handle for one box, with
//!   `current()` / `latest()` / `changed()` and a `Stream` adapter.
//!
//! - **[`synth`]**: Builds whole-box updates from single-slot intents.
//!
//! - **[`AccessoryView`]**: What an accessory framework would display.

pub mod accessory;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;
pub mod synth;

// ── Primary re-exports ──────────────────────────────────────────────
pub use accessory::{AccessoryView, CapsuleHost, PurifierState, ServiceView};
pub use command::{Command, CommandResult};
pub use config::{BridgeConfig, DeviceConfig, DeviceKind};
pub use controller::{ConnectionState, Controller};
pub use error::CoreError;
pub use model::{
    DeviceKey, DeviceState, ObservedSlot, ObservedState, SlotState, SyncState, UpdateSource,
};
pub use store::DeviceStore;
pub use stream::DeviceStream;
pub use synth::{DEFAULT_SLOT_SPEED, FieldChange};
