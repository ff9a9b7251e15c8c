// ── Core error types ──
//
// User-facing errors from moodo-core. Consumers never see HTTP bodies or
// socket frames directly: the `From<moodo_api::Error>` impl translates
// transport-layer errors into domain variants.

use thiserror::Error;

use crate::model::DeviceKey;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the Moodo API: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Moodo rejected the token: {message}")]
    Unauthorized { message: String },

    #[error("Coordinator is not running")]
    CoordinatorStopped,

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not configured: {key}")]
    DeviceNotFound { key: DeviceKey },

    #[error("Device {key} is powered off; capsule changes are rejected")]
    DevicePoweredOff { key: DeviceKey },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Remote errors (wrapped, not exposed raw) ─────────────────────
    #[error("Remote error: {message}")]
    Remote {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status of the underlying remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<moodo_api::Error> for CoreError {
    fn from(err: moodo_api::Error) -> Self {
        match err {
            moodo_api::Error::Unauthorized { status } => CoreError::Unauthorized {
                message: format!("HTTP {status}"),
            },
            moodo_api::Error::Transport(ref e) if e.is_connect() || e.is_timeout() => {
                CoreError::ConnectionFailed {
                    reason: e.to_string(),
                }
            }
            moodo_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            moodo_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            other => CoreError::Remote {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_becomes_remote_with_status() {
        let err = CoreError::from(moodo_api::Error::Status {
            status: 500,
            body: "boom".into(),
        });
        assert!(matches!(err, CoreError::Remote { status: Some(500), .. }));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn unauthorized_is_preserved() {
        let err = CoreError::from(moodo_api::Error::Unauthorized { status: 401 });
        assert!(matches!(err, CoreError::Unauthorized { .. }));
    }

    #[test]
    fn protocol_error_is_remote_without_status() {
        let err = CoreError::from(moodo_api::Error::Protocol("bad".into()));
        assert!(matches!(err, CoreError::Remote { status: None, .. }));
    }
}
