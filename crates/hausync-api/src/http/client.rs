// Controller HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction, Basic auth and
// `LL` envelope unwrapping. Endpoint groups (io commands, structure
// download) live in sibling files as inherent methods to keep this module
// focused on transport mechanics.

use secrecy::ExposeSecret;
use tracing::debug;
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;
use crate::http::models::{LlResponse, parse_envelope};
use crate::transport::TransportConfig;

/// Raw HTTP client for one controller address.
///
/// All `/jdev/...` methods return the unwrapped `LL` body; an `LL` code of
/// `"401"` is surfaced as [`Error::Authentication`] just like HTTP 401.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl HttpClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the controller root, e.g. `http://192.168.1.77` or
    /// `https://dns.example.net:8443`.
    pub fn new(
        base_url: Url,
        credentials: Option<Credentials>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: Option<Credentials>) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Append path segments to the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Attach Basic credentials when configured.
    pub(crate) fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => {
                builder.basic_auth(&creds.username, Some(creds.password.expose_secret()))
            }
            None => builder,
        }
    }

    /// Send a GET request and return the body after status checks.
    pub(crate) async fn get_text(
        &self,
        url: Url,
        timeout: Option<std::time::Duration>,
    ) -> Result<String, Error> {
        debug!("GET {}", url);

        let mut builder = self.authorized(self.http.get(url));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "controller rejected credentials (HTTP 401)".into(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        resp.text().await.map_err(Error::Transport)
    }

    /// Send a GET request and unwrap the `LL` envelope.
    pub(crate) async fn get_ll(&self, url: Url) -> Result<LlResponse, Error> {
        let body = self.get_text(url, None).await?;
        let ll = parse_envelope(&body)?;

        if ll.is_unauthorized() {
            return Err(Error::Authentication {
                message: format!("controller rejected credentials for {}", ll.control),
            });
        }

        Ok(ll)
    }
}
