// moodo-api: Async Rust client for the Moodo REST API and socket.io push channel

pub mod client;
pub mod error;
pub mod models;
pub mod push;
pub mod transport;

pub use client::{DEFAULT_API_URL, MoodoClient, RetryPolicy};
pub use error::Error;
pub use models::{
    BoxResponse, BoxStatus, BoxUpdate, BoxesResponse, CapsuleInfo, IntensityUpdate, RemoteBox,
    RemoteSlot, SlotUpdate,
};
pub use push::{DEFAULT_SOCKET_URL, PushConfig, PushHandle, PushStatus, ReconnectConfig};
pub use transport::TransportConfig;
