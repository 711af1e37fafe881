// hausync-api: Async Rust client for home-automation controller HTTP and realtime APIs

pub mod auth;
pub mod error;
pub mod http;
pub mod transport;
pub mod websocket;

pub use auth::{AuthScheme, Credentials};
pub use error::Error;
pub use http::{HttpClient, LlResponse};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{HandshakePhase, RealtimeSocket, ValueState};
