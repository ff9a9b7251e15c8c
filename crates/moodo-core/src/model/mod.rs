// ── Domain model ──
//
// Local view of a Moodo box. Wire types live in `moodo_api::models`;
// everything here is what the bridge reasons about.

mod device;

pub use device::{
    DeviceKey, DeviceState, MAX_LEVEL, ObservedSlot, ObservedState, SLOT_COUNT, SlotState,
    SyncState, UpdateSource,
};
