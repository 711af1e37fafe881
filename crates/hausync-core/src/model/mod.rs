// ── Domain model ──
//
// Types shared by the catalog, the state store, and consumers. Wire
// parsing of the structure document lives in `catalog`; these are the
// clean shapes everything else depends on.

pub mod control;
pub mod state;
pub mod status;

pub use control::{Category, Control, ControlKind, ControllerInfo, Room, StateRef};
pub use state::DeviceState;
pub use status::{ConnectionMode, ConnectionState, LinkType, NetworkStatus};
