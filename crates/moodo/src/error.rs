//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use moodo_config::ConfigError;
use moodo_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Moodo API: {reason}")]
    #[diagnostic(
        code(moodo::connection_failed),
        help("Check your network connection and the api_url in your config.")
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(moodo::auth_failed),
        help(
            "Verify your Moodo token.\n\
             Run: moodo config init"
        )
    )]
    AuthFailed { message: String },

    #[error("No Moodo token configured")]
    #[diagnostic(
        code(moodo::no_credentials),
        help(
            "Configure one with: moodo config init\n\
             Or pass --token / set MOODO_TOKEN."
        )
    )]
    NoCredentials,

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Box {key} is not configured")]
    #[diagnostic(
        code(moodo::not_found),
        help("Run: moodo boxes list to see configured boxes")
    )]
    NotFound { key: String },

    #[error("Box {key} is powered off")]
    #[diagnostic(
        code(moodo::powered_off),
        help("Capsules can only change while the box is on. Run: moodo power {key} on")
    )]
    PoweredOff { key: String },

    #[error("No boxes configured")]
    #[diagnostic(
        code(moodo::no_devices),
        help(
            "Add [[devices]] entries with id and name to {path}\n\
             Or run: moodo config init"
        )
    )]
    NoDevices { path: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(moodo::api_error))]
    ApiError { message: String, status: Option<u16> },

    #[error("The bridge stopped before the command completed")]
    #[diagnostic(code(moodo::stopped))]
    Stopped,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(moodo::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(moodo::config),
        help("Check the config file at {path}")
    )]
    Config { message: String, path: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    #[diagnostic(code(moodo::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(moodo::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Stopped => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoDevices { .. } => exit_code::NOT_FOUND,
            Self::PoweredOff { .. } => exit_code::CONFLICT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Unauthorized { message } => CliError::AuthFailed { message },
            CoreError::CoordinatorStopped => CliError::Stopped,
            CoreError::DeviceNotFound { key } => CliError::NotFound {
                key: key.to_string(),
            },
            CoreError::DevicePoweredOff { key } => CliError::PoweredOff {
                key: key.to_string(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Remote { message, status } => CliError::ApiError { message, status },
            CoreError::Config { message } => CliError::Config {
                message,
                path: moodo_config::config_path().display().to_string(),
            },
            CoreError::Internal(message) => CliError::ApiError {
                message,
                status: None,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials => CliError::NoCredentials,
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
                path: moodo_config::config_path().display().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodo_core::DeviceKey;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let not_found = CliError::from(CoreError::DeviceNotFound {
            key: DeviceKey::new(7),
        });
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);

        let off = CliError::from(CoreError::DevicePoweredOff {
            key: DeviceKey::new(7),
        });
        assert_eq!(off.exit_code(), exit_code::CONFLICT);

        let auth = CliError::from(CoreError::Unauthorized {
            message: "HTTP 401".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn api_error_message_includes_status() {
        let err = CliError::from(CoreError::Remote {
            message: "boom".into(),
            status: Some(503),
        });
        assert_eq!(err.to_string(), "API error (HTTP 503): boom");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn missing_token_is_auth_error() {
        let err = CliError::from(ConfigError::NoCredentials);
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
