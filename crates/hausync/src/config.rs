//! CLI configuration: a thin layer over `hausync_config` that applies
//! `GlobalOpts` flag overrides (--local, --password, etc.).

use secrecy::SecretString;

use hausync_config::{Config, ConfigError, Profile};
use hausync_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// How a command intends to use the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// One request/response round; no push channel, no bulk load.
    OneShot,
    /// Long-lived streaming.
    Streaming,
}

/// Pick the profile to use, or `None` when the flags alone must do.
fn select<'a>(
    global: &GlobalOpts,
    cfg: &'a Config,
) -> Result<Option<(String, &'a Profile)>, CliError> {
    let flags_only = global.local.is_some() || global.remote.is_some();

    match cfg.select_profile(global.profile.as_deref()) {
        Ok((name, profile)) => Ok(Some((name.to_owned(), profile))),
        Err(ConfigError::NoProfiles) if global.profile.is_none() => Ok(None),
        Err(ConfigError::ProfileNotFound { .. }) if global.profile.is_none() && flags_only => {
            Ok(None)
        }
        Err(ConfigError::ProfileNotFound { name }) => Err(CliError::ProfileNotFound {
            name,
            available: available(cfg),
        }),
        Err(other) => Err(other.into()),
    }
}

fn available(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Merge flags over the selected profile (or an empty one).
fn merged_profile(global: &GlobalOpts, base: Option<&Profile>) -> Profile {
    let mut profile = base.cloned().unwrap_or_default();
    if let Some(ref local) = global.local {
        profile.local = Some(local.clone());
    }
    if let Some(ref remote) = global.remote {
        profile.remote = Some(remote.clone());
    }
    if let Some(mode) = global.mode {
        profile.mode = mode.as_str().into();
    }
    if let Some(ref username) = global.username {
        profile.username = username.clone();
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}

/// Build a `ControllerConfig` from the config file, profile, and flags.
pub fn build_controller_config(
    global: &GlobalOpts,
    usage: Usage,
) -> Result<ControllerConfig, CliError> {
    let cfg = hausync_config::load_config()?;
    let selected = select(global, &cfg)?;

    if selected.is_none() && global.local.is_none() && global.remote.is_none() {
        return Err(CliError::NoConfig {
            path: hausync_config::config_path().display().to_string(),
        });
    }

    let profile_name = selected
        .as_ref()
        .map_or_else(|| "default".to_owned(), |(name, _)| name.clone());
    let profile = merged_profile(global, selected.map(|(_, p)| p));

    // Flag first, then the shared env → keyring → plaintext chain.
    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => hausync_config::resolve_password(&profile, &profile_name)?,
    };

    let mut config =
        hausync_config::controller_config_with_password(&profile, &cfg.defaults, password)?;

    if usage == Usage::OneShot {
        config.realtime_enabled = false;
        config.initial_fetch = false;
    }
    tracing::debug!(
        profile = %profile_name,
        local = ?config.local_address,
        remote = ?config.remote_address,
        mode = %config.mode,
        "controller config resolved"
    );
    Ok(config)
}
