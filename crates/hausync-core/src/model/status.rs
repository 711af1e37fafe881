// ── Connection and link status ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Realtime connection lifecycle, observable through `Controller`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// The controller issued a key; the key response is in flight.
    Authenticating,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Connected => f.write_str("connected"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Host network link as reported by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LinkType {
    Wifi,
    Cellular,
    Wired,
    None,
}

/// Classified network status derived from the latest [`LinkType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Disconnected,
    LocalLink,
    MeteredLink,
    WiredLink,
    #[default]
    Unknown,
}

impl From<LinkType> for NetworkStatus {
    fn from(link: LinkType) -> Self {
        match link {
            LinkType::Wifi => Self::LocalLink,
            LinkType::Cellular => Self::MeteredLink,
            LinkType::Wired => Self::WiredLink,
            LinkType::None => Self::Disconnected,
        }
    }
}

/// Which configured server address to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionMode {
    Local,
    Remote,
    /// Local when the last reachability probe succeeded, else remote.
    #[default]
    Automatic,
}
