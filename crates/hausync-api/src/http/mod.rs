// HTTP surface of the controller: `/jdev/sps/io` commands and state reads,
// the structure document, and the reachability probe.

pub mod client;
pub mod io;
pub mod models;
pub mod probe;
pub mod structure;

pub use client::HttpClient;
pub use models::{LlEnvelope, LlResponse};
pub use probe::{PROBE_TIMEOUT, probe};
