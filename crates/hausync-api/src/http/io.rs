// `/jdev/sps/io` endpoints: control commands and single-state reads.

use tracing::trace;

use crate::error::Error;
use crate::http::client::HttpClient;
use crate::http::models::LlResponse;

/// Command word that reads a value instead of changing it.
pub const STATE_COMMAND: &str = "state";

impl HttpClient {
    /// Issue `GET /jdev/sps/io/{control_id}/{command}`.
    ///
    /// Returns the `LL` body on code `"200"`; any other code becomes
    /// [`Error::CommandRejected`] (`"401"` is already an auth error).
    pub async fn send_command(&self, control_id: &str, command: &str) -> Result<LlResponse, Error> {
        let url = self.endpoint(&["jdev", "sps", "io", control_id, command])?;
        let ll = self.get_ll(url).await?;

        if !ll.is_success() {
            return Err(Error::CommandRejected {
                control: control_id.to_owned(),
                code: ll.code,
            });
        }

        trace!(control_id, command, value = %ll.value, "command acknowledged");
        Ok(ll)
    }

    /// Read the current numeric value of a state id.
    pub async fn fetch_state(&self, state_id: &str) -> Result<f64, Error> {
        let ll = self.send_command(state_id, STATE_COMMAND).await?;
        ll.value_f64().ok_or_else(|| Error::Deserialization {
            message: format!("state value for {state_id} is not numeric"),
            body: ll.value.to_string(),
        })
    }
}
