//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use purelink_config::ConfigError;
use purelink_core::{CoreError, DiscoveryError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Cloud ────────────────────────────────────────────────────────
    #[error("Cloud authentication failed: {message}")]
    #[diagnostic(
        code(purelink::auth_failed),
        help(
            "Check the account email, password and country.\n\
             The password is read from PURELINK_PASSWORD, the keyring or the config file."
        )
    )]
    AuthFailed { message: String },

    #[error("Could not reach the vendor cloud: {message}")]
    #[diagnostic(
        code(purelink::connection_failed),
        help("Check network access to the cloud host, or set cloud.base_url.")
    )]
    ConnectionFailed { message: String },

    #[error("Cloud request failed ({status}): {message}")]
    #[diagnostic(code(purelink::api_error))]
    Api { status: u16, message: String },

    // ── Local network ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(purelink::discovery),
        help("In a container, set discovery.container = true and export HOST_IP.")
    )]
    Discovery(#[from] DiscoveryError),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(purelink::validation))]
    Validation { field: String, reason: String },

    #[error("No password configured for '{email}'")]
    #[diagnostic(
        code(purelink::no_password),
        help(
            "Export PURELINK_PASSWORD, store it in the keyring under service 'purelink',\n\
             or set account.password in the config file."
        )
    )]
    NoPassword { email: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(code(purelink::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(purelink::config))]
    Config(ConfigError),

    // ── Everything else ──────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(purelink::core))]
    Core(CoreError),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(purelink::render))]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoPassword { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } | Self::Discovery(_) => exit_code::CONNECTION,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoPassword { email } => Self::NoPassword { email },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::CredentialsExpired => Self::AuthFailed {
                message: "credentials expired".into(),
            },
            CoreError::Cloud {
                message,
                status: Some(status),
            } => Self::Api { status, message },
            CoreError::Cloud {
                message,
                status: None,
            } => Self::ConnectionFailed { message },
            CoreError::Discovery(e) => Self::Discovery(e),
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other => Self::Core(other),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render(err.to_string())
    }
}
