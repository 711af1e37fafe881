// ── Runtime connection configuration ──
//
// These types describe *how* to reach a controller. They carry credential
// data and timing knobs but never touch disk: the CLI (or any other host)
// builds a `ControllerConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use hausync_api::{AuthScheme, Credentials, TlsMode, TransportConfig};

use crate::command::DispatchSettings;
use crate::fetcher::FetchSettings;
use crate::model::ConnectionMode;
use crate::realtime::ReconnectPolicy;

/// TLS verification strategy for HTTPS requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certificates).
    DangerAcceptInvalid,
}

/// Request and connect timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Single state reads and commands.
    pub request: Duration,
    /// Structure document download.
    pub structure: Duration,
    /// Local reachability probe.
    pub probe: Duration,
    /// Realtime socket connect + handshake.
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(5),
            structure: Duration::from_secs(30),
            probe: hausync_api::http::PROBE_TIMEOUT,
            connect: Duration::from_secs(10),
        }
    }
}

/// Configuration for one controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Address on the home network, e.g. `192.168.1.77`.
    pub local_address: Option<String>,
    /// Address reachable from outside, e.g. `dns.example.net:8443`.
    pub remote_address: Option<String>,
    pub mode: ConnectionMode,
    pub credentials: Credentials,
    pub auth_scheme: AuthScheme,
    pub tls: TlsVerification,
    pub timeouts: Timeouts,
    /// Use the push channel. When off, connect only validates HTTP access.
    pub realtime_enabled: bool,
    pub reconnect: ReconnectPolicy,
    pub fetch: FetchSettings,
    pub dispatch: DispatchSettings,
    /// Load every state over HTTP after connecting.
    pub initial_fetch: bool,
    /// Poll period while a room is focused.
    pub room_poll_interval: Duration,
    pub keepalive_interval: Duration,
    /// Quiet period after a link change before re-probing.
    pub probe_debounce: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            local_address: None,
            remote_address: None,
            mode: ConnectionMode::default(),
            credentials: Credentials::new("admin", ""),
            auth_scheme: AuthScheme::default(),
            tls: TlsVerification::default(),
            timeouts: Timeouts::default(),
            realtime_enabled: true,
            reconnect: ReconnectPolicy::default(),
            fetch: FetchSettings::default(),
            dispatch: DispatchSettings::default(),
            initial_fetch: true,
            room_poll_interval: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(60),
            probe_debounce: Duration::from_millis(500),
        }
    }
}

impl ControllerConfig {
    pub(crate) fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeouts.request,
        }
    }
}
