// ── Core error types ──
//
// Each collaborator boundary gets its own focused enum so callers can
// match on what actually went wrong. `CoreError` is the umbrella the
// pollers and the CLI deal with; `From<purelink_api::Error>` folds the
// cloud client's transport failures into it.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Cloud ────────────────────────────────────────────────────────
    #[error("Cloud authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cloud credentials expired")]
    CredentialsExpired,

    #[error("Cloud request failed: {message}")]
    Cloud {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Subsystems ───────────────────────────────────────────────────
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<purelink_api::Error> for CoreError {
    fn from(err: purelink_api::Error) -> Self {
        match err {
            purelink_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            purelink_api::Error::SessionExpired => CoreError::CredentialsExpired,
            purelink_api::Error::Status { status, body } => CoreError::Cloud {
                message: body,
                status: Some(status),
            },
            other => CoreError::Cloud {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl CoreError {
    /// Returns `true` if re-authenticating with the cloud might fix this.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::CredentialsExpired)
    }
}

// ── Focused errors ───────────────────────────────────────────────────

/// Why a `set_state` request could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("device '{device_id}' not connected")]
    NotConnected { device_id: String },

    #[error("state of device '{device_id}' unknown")]
    StateUnknown { device_id: String },

    #[error("publishing to device '{device_id}' failed: {reason}")]
    PublishFailed { device_id: String, reason: String },
}

/// Failures of the publish/subscribe link.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connecting to {address}:{port} failed: {reason}")]
    ConnectFailed {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("broker did not acknowledge the connection within {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("link closed")]
    Closed,
}

/// Failures reported by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("platform rejected '{operation}' for '{device_id}': {reason}")]
    Rejected {
        operation: &'static str,
        device_id: String,
        reason: String,
    },

    #[error("platform not connected")]
    NotConnected,

    #[error("platform command stream closed")]
    Closed,

    #[error("platform I/O error: {0}")]
    Io(String),
}

/// Failures decrypting a device's local broker credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("credential has invalid length or padding")]
    Cipher,

    #[error("decrypted credential is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decrypted credential has no 'apPasswordHash' field")]
    MissingHash,
}

/// Failures of the local network discovery pass.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not determine local address: {0}")]
    LocalAddress(String),

    #[error("local address {0} is not an IPv4 address")]
    NotIpv4(String),
}

/// Failures inside a device service handler.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device '{device_id}' has no {what} yet")]
    Unavailable {
        device_id: String,
        what: &'static str,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_maps_to_cloud_error() {
        let err: CoreError = purelink_api::Error::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Cloud {
                status: Some(502),
                ..
            }
        ));
    }

    #[test]
    fn api_session_expired_maps_to_credentials_expired() {
        let err: CoreError = purelink_api::Error::SessionExpired.into();
        assert!(err.is_auth_expired());
    }
}
