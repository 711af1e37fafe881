//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hausync_config::ConfigError;
use hausync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller: {reason}")]
    #[diagnostic(
        code(hausync::connection_failed),
        help(
            "Check that the controller is powered and reachable.\n\
             Try a specific address: hausync --mode local rooms"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("No network link available")]
    #[diagnostic(code(hausync::network_unavailable))]
    NetworkUnavailable,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hausync::auth_failed),
        help("Verify the username and password.\nRun: hausync config set-password --profile <name>")
    )]
    AuthFailed { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(hausync::no_credentials),
        help(
            "Store one with: hausync config set-password\n\
             Or set the HAUSYNC_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hausync::not_found),
        help("Run: hausync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller error ({code}): {message}")]
    #[diagnostic(code(hausync::controller_error))]
    Controller { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hausync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hausync::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(hausync::no_config),
        help(
            "Add a profile to {path}\n\
             or pass an address: hausync --local 192.168.1.77 rooms"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hausync::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(hausync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NetworkUnavailable => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConfigured => CliError::NoConfig {
                path: hausync_config::config_path().display().to_string(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::ConnectionFailed(reason) => CliError::ConnectionFailed { reason },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::NetworkUnavailable => CliError::NetworkUnavailable,
            CoreError::InvalidResponse { message } => CliError::Controller {
                code: "invalid_response".into(),
                message,
            },
            CoreError::Structure(e) => CliError::Controller {
                code: "structure".into(),
                message: e.to_string(),
            },
            CoreError::CommandFailed(message) => CliError::Controller {
                code: "command_failed".into(),
                message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
