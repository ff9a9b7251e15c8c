// ── Device state mirror ──

mod device_store;

pub use device_store::DeviceStore;
