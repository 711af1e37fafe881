#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use pretty_assertions::assert_eq;

use hausync_config::{Config, ConfigError, Profile, load_config_from, save_config_to};

const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"

[profiles.home]
local = "192.168.1.77"
remote = "dns.example.net:8443"
username = "owner"
password_env = "HOME_CONTROLLER_PW"
auth_scheme = "hmac-sha256"

[profiles.cabin]
remote = "cabin.example.net"
mode = "remote"
ca_cert = "/etc/hausync/cabin.pem"
realtime = false
"#;

#[test]
fn loads_profiles_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let cfg = load_config_from(&path).unwrap();

    assert_eq!(cfg.default_profile.as_deref(), Some("home"));
    assert_eq!(cfg.defaults.output, "json");
    assert_eq!(cfg.defaults.color, "auto");
    assert_eq!(cfg.profiles.len(), 2);

    let home = &cfg.profiles["home"];
    assert_eq!(home.username, "owner");
    assert_eq!(home.mode, "automatic");
    assert_eq!(home.auth_scheme, "hmac-sha256");

    let cabin = &cfg.profiles["cabin"];
    assert_eq!(cabin.username, "admin");
    assert_eq!(cabin.ca_cert, Some(PathBuf::from("/etc/hausync/cabin.pem")));
    assert_eq!(cabin.realtime, Some(false));

    let (name, _) = cfg.select_profile(None).unwrap();
    assert_eq!(name, "home");
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(cfg.defaults.output, "table");
    assert!(cfg.profiles.is_empty());
    assert!(matches!(cfg.select_profile(None), Err(ConfigError::NoProfiles)));
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.home\nlocal = ").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.default_profile = Some("flat".into());
    cfg.profiles.insert(
        "flat".into(),
        Profile {
            local: Some("10.0.0.5".into()),
            mode: "local".into(),
            username: "admin".into(),
            auth_scheme: "plain".into(),
            timeout: Some(3),
            ..Profile::default()
        },
    );
    save_config_to(&cfg, &path).unwrap();

    let loaded = load_config_from(&path).unwrap();
    let (name, profile) = loaded.select_profile(None).unwrap();
    assert_eq!(name, "flat");
    assert_eq!(profile.local.as_deref(), Some("10.0.0.5"));
    assert_eq!(profile.mode, "local");
    assert_eq!(profile.timeout, Some(3));
}
