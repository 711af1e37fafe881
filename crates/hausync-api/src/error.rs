use thiserror::Error;

/// Top-level error type for the `hausync-api` crate.
///
/// Covers every failure mode across both transports: the `/jdev` HTTP
/// surface, the structure document download, and the realtime socket.
/// `hausync-core` maps these into the caller-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected (HTTP 401 or an `LL` code of `"401"`).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or handshake timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP API ────────────────────────────────────────────────────
    /// Non-success HTTP status from the controller.
    #[error("Controller returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The controller answered, but with a non-`200` `LL` code.
    #[error("Command rejected for {control} (code {code})")]
    CommandRejected { control: String, code: String },

    // ── Realtime socket ─────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The key / authenticate exchange did not follow the protocol.
    #[error("Realtime handshake failed: {0}")]
    Handshake(String),

    /// The controller announced it is going out of service (reboot, update).
    #[error("Controller is going out of service")]
    OutOfService,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A binary frame was too short or otherwise malformed.
    #[error("Malformed binary frame: {0}")]
    Frame(String),
}

impl Error {
    /// Returns `true` if the credentials were rejected.
    ///
    /// Authentication failures are never worth retrying against another
    /// address: wrong credentials fail identically everywhere.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth failing over or
    /// retrying (timeouts, refused connections, TLS trouble, dropped sockets).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. }
            | Self::Tls(_)
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::OutOfService => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_transient() {
        let err = Error::Authentication {
            message: "bad password".into(),
        };
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[test]
    fn socket_and_server_errors_are_transient() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(Error::OutOfService.is_transient());
        assert!(
            Error::Api {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(
            !Error::Api {
                status: 404,
                message: "missing".into()
            }
            .is_transient()
        );
    }
}
