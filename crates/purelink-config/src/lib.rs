//! Configuration for the purelink bridge.
//!
//! A TOML file plus `PURELINK_*` environment overrides, account password
//! resolution (env → keyring → plaintext) and translation to
//! `purelink_core::BridgeConfig`. The core crate never reads files; this
//! is the only place that does.

use std::collections::HashMap;
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

use purelink_core::{
    AccountCredentials, BridgeConfig, CloudSettings, DiscoverySettings, SessionSettings, TlsMode,
};

/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "PURELINK_PASSWORD";

const ENV_PREFIX: &str = "PURELINK_";
const KEYRING_SERVICE: &str = "purelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for account '{email}'")]
    NoPassword { email: String },

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
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub account: Account,
    #[serde(default)]
    pub cloud: Cloud,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub platform: Platform,
}

/// Vendor account the bridge logs in with.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Account {
    #[serde(default)]
    pub email: String,
    /// Plaintext password (prefer keyring or `PURELINK_PASSWORD`).
    pub password: Option<String>,
    /// Two-letter country code.
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Cloud {
    pub host: String,
    /// Full base URL, overriding `host`.
    pub base_url: Option<String>,
    /// Cached API user; skips the login step when set with `password`.
    pub user: Option<String>,
    pub password: Option<String>,
    pub poll_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,
}

impl Default for Cloud {
    fn default() -> Self {
        Self {
            host: "api.cp.dyson.com".into(),
            base_url: None,
            user: None,
            password: None,
            poll_interval_secs: 300,
            retry_delay_secs: 30,
            timeout_secs: 30,
            insecure: false,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Discovery {
    pub interval_secs: u64,
    pub port: u16,
    pub ping_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub ping_workers: usize,
    pub probe_workers: usize,
    /// Read the local address from `HOST_IP` instead of the routing table.
    pub container: bool,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            port: 1883,
            ping_timeout_secs: 1,
            probe_timeout_secs: 2,
            ping_workers: 84,
            probe_workers: 16,
            container: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Session {
    pub keepalive_secs: u64,
    pub sensor_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_command_age_secs: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            keepalive_secs: 60,
            sensor_interval_secs: 30,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 2,
            max_command_age_secs: 30,
        }
    }
}

/// Platform-side identifiers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Platform {
    /// Device-type id per model number, e.g. `"475" = "urn:..."`.
    #[serde(default)]
    pub device_types: HashMap<String, String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "purelink", "purelink").map_or_else(
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
    p.push("purelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from `path` (or the default path) and the environment.
///
/// A missing file is not an error; defaults and env still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    load_from(&path, Env::prefixed(ENV_PREFIX).split("__"))
}

fn load_from(path: &Path, env: Env) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(env)
        .extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML at `path`, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// TOML rendering with every secret masked.
pub fn redacted(cfg: &Config) -> Result<String, ConfigError> {
    let mask = |s: &Option<String>| s.as_ref().map(|_| "****".to_owned());
    let mut shown = cfg.clone();
    shown.account.password = mask(&shown.account.password);
    shown.cloud.password = mask(&shown.cloud.password);
    Ok(toml::to_string_pretty(&shown)?)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password: env var, then keyring, then plaintext.
pub fn resolve_password(account: &Account) -> Result<SecretString, ConfigError> {
    resolve_password_with(account, std::env::var(PASSWORD_ENV).ok(), || {
        keyring::Entry::new(KEYRING_SERVICE, &account.email)
            .and_then(|entry| entry.get_password())
            .ok()
    })
}

fn resolve_password_with(
    account: &Account,
    env: Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Some(pw) = env.filter(|pw| !pw.is_empty()) {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Some(pw) = keyring() {
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(pw) = account.password.as_ref().filter(|pw| !pw.is_empty()) {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoPassword {
        email: account.email.clone(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `BridgeConfig`, resolving the account password.
pub fn to_bridge_config(cfg: &Config) -> Result<BridgeConfig, ConfigError> {
    let password = resolve_password(&cfg.account)?;
    build_bridge_config(cfg, password)
}

/// Periods and timeouts that drive timers must be at least one second.
fn require_secs(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(())
}

/// Discovery tuning alone; needs no account credentials.
pub fn discovery_settings(discovery: &Discovery) -> Result<DiscoverySettings, ConfigError> {
    if discovery.ping_workers == 0 || discovery.probe_workers == 0 {
        return Err(ConfigError::Validation {
            field: "discovery".into(),
            reason: "worker counts must be at least 1".into(),
        });
    }
    require_secs("discovery.interval_secs", discovery.interval_secs)?;
    let secs = Duration::from_secs;
    Ok(DiscoverySettings {
        interval: secs(discovery.interval_secs),
        port: discovery.port,
        ping_timeout: secs(discovery.ping_timeout_secs),
        probe_timeout: secs(discovery.probe_timeout_secs),
        ping_workers: discovery.ping_workers,
        probe_workers: discovery.probe_workers,
        container: discovery.container,
    })
}

fn build_bridge_config(cfg: &Config, password: SecretString) -> Result<BridgeConfig, ConfigError> {
    let account = &cfg.account;
    if account.email.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "account.email".into(),
            reason: "must not be empty".into(),
        });
    }
    if account.country.len() != 2 {
        return Err(ConfigError::Validation {
            field: "account.country".into(),
            reason: format!("expected a two-letter code, got '{}'", account.country),
        });
    }

    let base_url = cfg
        .cloud
        .base_url
        .as_deref()
        .map(|raw| {
            raw.parse::<url::Url>().map_err(|_| ConfigError::Validation {
                field: "cloud.base_url".into(),
                reason: format!("invalid URL: {raw}"),
            })
        })
        .transpose()?;

    let discovery = discovery_settings(&cfg.discovery)?;
    require_secs("cloud.poll_interval_secs", cfg.cloud.poll_interval_secs)?;
    require_secs("session.sensor_interval_secs", cfg.session.sensor_interval_secs)?;
    require_secs("session.connect_timeout_secs", cfg.session.connect_timeout_secs)?;

    let tls = if cfg.cloud.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cfg.cloud.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let secs = Duration::from_secs;
    Ok(BridgeConfig {
        account: AccountCredentials {
            email: account.email.trim().to_owned(),
            password,
            country: account.country.to_uppercase(),
        },
        cloud: CloudSettings {
            host: cfg.cloud.host.clone(),
            base_url,
            api_user: cfg.cloud.user.clone(),
            api_password: cfg.cloud.password.clone().map(SecretString::from),
            poll_interval: secs(cfg.cloud.poll_interval_secs),
            retry_delay: secs(cfg.cloud.retry_delay_secs),
            timeout: secs(cfg.cloud.timeout_secs),
            tls,
        },
        discovery,
        session: SessionSettings {
            keepalive: secs(cfg.session.keepalive_secs),
            sensor_interval: secs(cfg.session.sensor_interval_secs),
            connect_timeout: secs(cfg.session.connect_timeout_secs),
            reconnect_delay: secs(cfg.session.reconnect_delay_secs),
            max_command_age: secs(cfg.session.max_command_age_secs),
        },
        device_types: cfg.platform.device_types.clone(),
    })
}
