// Lightweight reachability probe.

use std::time::Duration;

use tracing::debug;
use url::Url;

/// Default probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Send a `HEAD` request to `url`.
///
/// Any HTTP response, whatever its status, counts as reachable: the goal
/// is to learn whether something answers at that address, not whether the
/// path exists. Only transport failures (refused, timeout, DNS) return
/// `false`.
pub async fn probe(http: &reqwest::Client, url: Url, timeout: Duration) -> bool {
    match http.head(url.clone()).timeout(timeout).send().await {
        Ok(resp) => {
            debug!(url = %url, status = %resp.status(), "probe answered");
            true
        }
        Err(e) => {
            debug!(url = %url, error = %e, "probe failed");
            false
        }
    }
}
