// ── Runtime bridge configuration ──
//
// These types describe how the bridge talks to the cloud, scans the
// network and paces device sessions. They carry credentials and tuning
// but never touch disk: the binary builds a `BridgeConfig` and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

pub use purelink_api::TlsMode;

/// Account credentials used to log in to the vendor cloud.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub email: String,
    pub password: SecretString,
    /// Two-letter country code the account is registered in.
    pub country: String,
}

/// Cloud inventory polling.
#[derive(Debug, Clone)]
pub struct CloudSettings {
    /// API host, e.g. `api.cp.dyson.com`.
    pub host: String,
    /// Full base URL override; takes precedence over `host`.
    pub base_url: Option<Url>,
    /// Cached API credentials. When absent the poller logs in first.
    pub api_user: Option<String>,
    pub api_password: Option<SecretString>,
    pub poll_interval: Duration,
    /// Delay between failed login attempts.
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub tls: TlsMode,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            host: "api.cp.dyson.com".into(),
            base_url: None,
            api_user: None,
            api_password: None,
            poll_interval: Duration::from_secs(300),
            retry_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            tls: TlsMode::default(),
        }
    }
}

/// Local network discovery.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub interval: Duration,
    /// Broker port probed on every reachable host.
    pub port: u16,
    pub ping_timeout: Duration,
    pub probe_timeout: Duration,
    pub ping_workers: usize,
    pub probe_workers: usize,
    /// Running inside a container: take the local address from `HOST_IP`.
    pub container: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            port: 1883,
            ping_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            ping_workers: 84,
            probe_workers: 16,
            container: false,
        }
    }
}

/// Per-device session pacing.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub keepalive: Duration,
    pub sensor_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Commands older than this are dropped unanswered.
    pub max_command_age: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(60),
            sensor_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
            max_command_age: Duration::from_secs(30),
        }
    }
}

/// Everything the bridge needs to run.
///
/// Built by the binary, passed to [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub account: AccountCredentials,
    pub cloud: CloudSettings,
    pub discovery: DiscoverySettings,
    pub session: SessionSettings,
    /// Platform device-type id per model number.
    pub device_types: HashMap<String, String>,
}

impl BridgeConfig {
    /// Configuration with default tuning for the given account.
    pub fn new(account: AccountCredentials) -> Self {
        Self {
            account,
            cloud: CloudSettings::default(),
            discovery: DiscoverySettings::default(),
            session: SessionSettings::default(),
            device_types: HashMap::new(),
        }
    }
}
