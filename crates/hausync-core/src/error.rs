// ── Core error types ──
//
// User-facing errors from hausync-core. Consumers never see HTTP status
// codes, socket close frames, or JSON parse failures directly: the
// `From<hausync_api::Error>` impl folds them into the domain taxonomy.

use thiserror::Error;

use crate::catalog::StructureError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup ────────────────────────────────────────────────────────
    #[error("No controller address is configured")]
    NotConfigured,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Cannot connect to controller: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("No network link available")]
    NetworkUnavailable,

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Invalid response from controller: {message}")]
    InvalidResponse { message: String },

    #[error(transparent)]
    Structure(#[from] StructureError),

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl CoreError {
    /// Credentials were rejected. Never retried on another address.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Worth retrying later or on another address.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::NetworkUnavailable)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hausync_api::Error> for CoreError {
    fn from(err: hausync_api::Error) -> Self {
        use hausync_api::Error as Api;

        match err {
            Api::Authentication { message } => Self::AuthenticationFailed { message },
            Api::Transport(e) => Self::ConnectionFailed(e.to_string()),
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => {
                Self::ConnectionFailed(format!("timed out after {timeout_secs}s"))
            }
            Api::Tls(msg) => Self::ConnectionFailed(format!("TLS error: {msg}")),
            Api::Api { status, message } if status >= 500 => {
                Self::ConnectionFailed(format!("HTTP {status}: {message}"))
            }
            Api::Api { status, message } => Self::InvalidResponse {
                message: format!("HTTP {status}: {message}"),
            },
            Api::CommandRejected { control, code } => {
                Self::CommandFailed(format!("controller answered code {code} for {control}"))
            }
            Api::WebSocketConnect(reason) => {
                Self::ConnectionFailed(format!("realtime socket: {reason}"))
            }
            Api::WebSocketClosed { code, reason } => {
                Self::ConnectionFailed(format!("realtime socket closed (code {code}): {reason}"))
            }
            Api::Handshake(reason) => Self::ConnectionFailed(format!("handshake: {reason}")),
            Api::OutOfService => Self::ConnectionFailed("controller is out of service".into()),
            Api::Deserialization { message, body: _ } => Self::InvalidResponse { message },
            Api::Frame(message) => Self::InvalidResponse { message },
        }
    }
}
