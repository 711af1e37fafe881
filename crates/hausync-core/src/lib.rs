// hausync-core: Realtime device-state synchronization between hausync-api and consumers.

pub mod catalog;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod network;
pub mod realtime;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{Catalog, StructureError};
pub use command::{Command, CommandAck, CommandDispatcher, CommandKind, DispatchSettings};
pub use config::{ControllerConfig, Timeouts, TlsVerification};
pub use controller::Controller;
pub use error::CoreError;
pub use fetcher::{BatchFetcher, FetchFailure, FetchReport, FetchSettings, StateSource};
pub use network::TransportSelector;
pub use realtime::ReconnectPolicy;
pub use store::{StateStore, StateStream};

pub use model::{
    Category, ConnectionMode, ConnectionState, Control, ControlKind, ControllerInfo, DeviceState,
    LinkType, NetworkStatus, Room, StateRef,
};

// Credential types live in the transport crate; re-exported for hosts.
pub use hausync_api::{AuthScheme, Credentials};
