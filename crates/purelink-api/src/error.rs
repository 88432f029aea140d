use thiserror::Error;

/// Top-level error type for the `purelink-api` crate.
///
/// Covers every failure mode of the vendor cloud surface: account login,
/// transport, unexpected HTTP status and payload decoding. `purelink-core`
/// maps these into its own error type; the inventory poller treats all of
/// them as transient.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, unknown country, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// API credentials were rejected by the manifest endpoint.
    #[error("API credentials expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Responses ───────────────────────────────────────────────────
    /// Any non-2xx status that is not an auth failure.
    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if fresh API credentials might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::SessionExpired => true,
            _ => false,
        }
    }
}
