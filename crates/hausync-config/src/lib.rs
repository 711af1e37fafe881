//! Shared configuration for hausync tools.
//!
//! TOML profiles, password resolution (env + keyring + plaintext),
//! and translation to `hausync_core::ControllerConfig`. Core never reads
//! files; hosts load a profile here and hand the result in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use hausync_core::{AuthScheme, ConnectionMode, ControllerConfig, Credentials, TlsVerification};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "HAUSYNC_CONFIG";
/// Environment variable consulted for the password of any profile.
pub const PASSWORD_ENV: &str = "HAUSYNC_PASSWORD";

const KEYRING_SERVICE: &str = "hausync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no profiles configured")]
    NoProfiles,

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    5
}

/// A named controller profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Address on the home network (e.g. "192.168.1.77").
    pub local: Option<String>,

    /// Address reachable from outside (e.g. "dns.example.net:8443").
    pub remote: Option<String>,

    /// "local", "remote", or "automatic".
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_username")]
    pub username: String,

    /// Plaintext password; prefer the keyring or `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// "plain" or "hmac-sha256".
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates (self-signed remote endpoints).
    pub insecure: Option<bool>,

    /// Override the request timeout (seconds).
    pub timeout: Option<u64>,

    /// Use the realtime push channel.
    pub realtime: Option<bool>,

    /// Room poll period in seconds.
    pub room_poll_interval: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            mode: default_mode(),
            username: default_username(),
            password: None,
            password_env: None,
            auth_scheme: default_auth_scheme(),
            ca_cert: None,
            insecure: None,
            timeout: None,
            realtime: None,
            room_poll_interval: None,
        }
    }
}

fn default_mode() -> String {
    "automatic".into()
}
fn default_username() -> String {
    "admin".into()
}
fn default_auth_scheme() -> String {
    "plain".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `HAUSYNC_CONFIG`, else platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("net", "hausync", "hausync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hausync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` layered under `HAUSYNC_*` environment variables.
///
/// Nested keys use a double underscore: `HAUSYNC_DEFAULTS__OUTPUT=json`.
/// A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HAUSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile selection ───────────────────────────────────────────────

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`, else
    /// the only profile when exactly one exists.
    pub fn select_profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let requested = name.or(self.default_profile.as_deref());
        if let Some(wanted) = requested {
            if let Some((key, profile)) = self.profiles.get_key_value(wanted) {
                return Ok((key.as_str(), profile));
            }
            // Only the implicit "default" may fall through.
            if name.is_some() || wanted != "default" {
                return Err(ConfigError::ProfileNotFound {
                    name: wanted.into(),
                });
            }
        }

        let mut iter = self.profiles.iter();
        match (iter.next(), iter.next()) {
            (Some((key, profile)), None) => Ok((key.as_str(), profile)),
            (None, _) => Err(ConfigError::NoProfiles),
            (Some(_), Some(_)) => Err(ConfigError::ProfileNotFound {
                name: requested.unwrap_or("default").into(),
            }),
        }
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password for a profile.
///
/// Order: the profile's `password_env`, `HAUSYNC_PASSWORD`, the system
/// keyring, then the plaintext `password` field.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |var| std::env::var(var).ok(),
        |name| {
            keyring::Entry::new(KEYRING_SERVICE, &keyring_user(name))
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env
    if let Some(pw) = profile.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(pw));
    }

    // 2. Global env var
    if let Some(pw) = env(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. Keyring
    if let Some(pw) = keyring(profile_name) {
        return Ok(SecretString::from(pw));
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_mode(raw: &str) -> Result<ConnectionMode, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "mode".into(),
        reason: format!("expected 'local', 'remote', or 'automatic', got '{raw}'"),
    })
}

fn parse_auth_scheme(raw: &str) -> Result<AuthScheme, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "plain" => Ok(AuthScheme::Plain),
        "hmac" | "hmac-sha256" => Ok(AuthScheme::HmacSha256),
        other => Err(ConfigError::Validation {
            field: "auth_scheme".into(),
            reason: format!("expected 'plain' or 'hmac-sha256', got '{other}'"),
        }),
    }
}

fn non_empty(addr: Option<&String>) -> Option<String> {
    addr.map(|a| a.trim()).filter(|a| !a.is_empty()).map(str::to_owned)
}

/// Build a `ControllerConfig` from a profile.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    controller_config_with_password(profile, defaults, password)
}

/// Build a `ControllerConfig` with an already-resolved password.
pub fn controller_config_with_password(
    profile: &Profile,
    defaults: &Defaults,
    password: SecretString,
) -> Result<ControllerConfig, ConfigError> {
    let local_address = non_empty(profile.local.as_ref());
    let remote_address = non_empty(profile.remote.as_ref());
    if local_address.is_none() && remote_address.is_none() {
        return Err(ConfigError::Validation {
            field: "local".into(),
            reason: "a profile needs a local or a remote address".into(),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = ControllerConfig {
        local_address,
        remote_address,
        mode: parse_mode(&profile.mode)?,
        credentials: Credentials {
            username: profile.username.clone(),
            password,
        },
        auth_scheme: parse_auth_scheme(&profile.auth_scheme)?,
        tls,
        realtime_enabled: profile.realtime.unwrap_or(true),
        ..ControllerConfig::default()
    };
    config.timeouts.request = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(secs) = profile.room_poll_interval {
        config.room_poll_interval = Duration::from_secs(secs.max(1));
    }
    Ok(config)
}
