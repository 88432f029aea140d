// ── Inbound command routing ──

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::PlatformError;
use crate::manager::SessionManager;
use crate::model::{Command, CommandResponse, CompletionStrategy};
use crate::platform::Platform;
use crate::service;

/// Pause after a failed receive before asking the platform again.
const RECEIVE_RETRY: Duration = Duration::from_secs(1);

/// What happened to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    UnknownDevice,
    Stale,
    /// Handler ran; `responded` is set when a response send was started.
    Handled { response: Value, responded: bool },
}

/// Pulls commands from the platform and dispatches them to device services.
pub struct CommandRouter {
    manager: Arc<SessionManager>,
    platform: Arc<dyn Platform>,
    max_age: Duration,
}

impl CommandRouter {
    pub fn new(manager: Arc<SessionManager>, platform: Arc<dyn Platform>, max_age: Duration) -> Self {
        Self {
            manager,
            platform,
            max_age,
        }
    }

    /// Route commands until cancelled or the platform closes its stream.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.platform.receive_command() => received,
            };

            match received {
                Ok(command) => {
                    self.route(command, Utc::now()).await;
                }
                Err(PlatformError::Closed) => {
                    debug!("command stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "could not receive command");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECEIVE_RETRY) => {}
                    }
                }
            }
        }
    }

    /// Handle a single command as of `now`.
    pub async fn route(&self, command: Command, now: DateTime<Utc>) -> Routed {
        let Some(device) = self.manager.lookup(&command.device_id).await else {
            error!(device_id = %command.device_id, "received command for unknown device");
            return Routed::UnknownDevice;
        };

        let age = now.signed_duration_since(command.timestamp);
        let too_old = age
            .to_std()
            .is_ok_and(|age| age > self.max_age);
        if too_old {
            warn!(
                device_id = %command.device_id,
                correlation_id = %command.correlation_id,
                age_secs = age.num_seconds(),
                "dropped command, max age exceeded"
            );
            return Routed::Stale;
        }

        let response = match service::invoke(
            &device,
            &command.service_id,
            command.payload.as_deref(),
        )
        .await
        {
            Ok(body) => body,
            Err(e) => {
                error!(
                    device_id = %command.device_id,
                    service = %command.service_id,
                    error = %e,
                    "command failed"
                );
                json!({ "status": 1 })
            }
        };

        // Sent on its own task; routing does not wait for the platform.
        let responded = command.completion_strategy == CompletionStrategy::Pessimistic;
        if responded {
            let envelope = CommandResponse::to_command(&command, response.clone());
            let platform = Arc::clone(&self.platform);
            tokio::spawn(async move {
                let device_id = envelope.device_id.clone();
                if let Err(e) = platform.send_response(envelope).await {
                    error!(device_id = %device_id, error = %e, "could not send response");
                }
            });
        }

        Routed::Handled {
            response,
            responded,
        }
    }
}
