// Structure document download.

use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::http::client::HttpClient;

/// Path segments of the structure document.
const STRUCTURE_PATH: [&str; 2] = ["data", "LoxAPP3.json"];

impl HttpClient {
    /// Download the structure document (rooms, categories, controls).
    ///
    /// The file is large on real installations, so it gets its own
    /// (longer) timeout instead of the client default.
    pub async fn fetch_structure(&self, timeout: Duration) -> Result<serde_json::Value, Error> {
        let url = self.endpoint(&STRUCTURE_PATH)?;
        let body = self.get_text(url, Some(timeout)).await?;
        debug!(bytes = body.len(), "structure document downloaded");

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("structure document is not valid JSON: {e}"),
            body: body.chars().take(200).collect(),
        })
    }
}
