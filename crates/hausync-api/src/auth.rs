use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

/// Username/password pair used for HTTP Basic auth and the realtime
/// `authenticate` command.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// `user:password`, the string both auth schemes operate on.
    fn joined(&self) -> String {
        format!("{}:{}", self.username, self.password.expose_secret())
    }

    /// `user:password` with each side percent-encoded, safe to place in a
    /// command path.
    fn path_joined(&self) -> String {
        format!(
            "{}:{}",
            path_component(&self.username),
            path_component(self.password.expose_secret())
        )
    }
}

/// Percent-encode one path component. Spaces become `%20`, not `+`.
fn path_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// How the realtime channel answers the key issued by `jdev/sys/getkey`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// Send `user:password` in the clear, percent-encoded for the command
    /// path. This is what deployed controllers accept today; the socket is
    /// the only protection.
    #[default]
    Plain,
    /// Send `hex(HMAC-SHA256(key, "user:password"))`.
    HmacSha256,
}

impl AuthScheme {
    /// Compute the value sent as `authenticate/{response}`.
    ///
    /// The controller issues its key hex-encoded; if it does not decode as
    /// hex the raw key bytes are used instead.
    pub fn key_response(self, key: &str, credentials: &Credentials) -> String {
        match self {
            Self::Plain => credentials.path_joined(),
            Self::HmacSha256 => {
                let key_bytes = hex::decode(key).unwrap_or_else(|_| key.as_bytes().to_vec());
                // HMAC accepts keys of any length, so this cannot fail.
                let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&key_bytes) else {
                    return credentials.path_joined();
                };
                mac.update(credentials.joined().as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}
