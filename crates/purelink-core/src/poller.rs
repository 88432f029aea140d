// ── Background pollers ──
//
// Two loops feed the session manager: one pulls the device inventory from
// the vendor cloud, the other sweeps the LAN for the devices it knows.
// Only successful snapshots are reconciled; a failed poll leaves the
// previous view untouched until the next tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use purelink_api::{ApiCredentials, CloudClient, TransportConfig};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AccountCredentials, CloudSettings};
use crate::discovery::Discovery;
use crate::error::CoreError;
use crate::manager::SessionManager;
use crate::model::DeviceRecord;

// ── CloudInventory ───────────────────────────────────────────────

/// Authenticated access to the account's device manifest.
pub struct CloudInventory {
    client: CloudClient,
    account: AccountCredentials,
    device_types: HashMap<String, String>,
    credentials: Mutex<Option<ApiCredentials>>,
}

impl CloudInventory {
    pub fn new(
        client: CloudClient,
        account: AccountCredentials,
        credentials: Option<ApiCredentials>,
        device_types: HashMap<String, String>,
    ) -> Self {
        Self {
            client,
            account,
            device_types,
            credentials: Mutex::new(credentials),
        }
    }

    /// Build the client and seed any cached API credentials from settings.
    pub fn from_settings(
        settings: &CloudSettings,
        account: AccountCredentials,
        device_types: HashMap<String, String>,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: settings.tls.clone(),
            timeout: settings.timeout,
        };
        let client = match &settings.base_url {
            Some(url) => CloudClient::new(url.clone(), &transport)?,
            None => CloudClient::from_host(&settings.host, &transport)?,
        };

        let cached = match (&settings.api_user, &settings.api_password) {
            (Some(account), Some(password)) if !password.expose_secret().is_empty() => {
                Some(ApiCredentials {
                    account: account.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        };

        Ok(Self::new(client, account, cached, device_types))
    }

    pub async fn has_credentials(&self) -> bool {
        self.credentials.lock().await.is_some()
    }

    /// Exchange the account login for API credentials and keep them.
    pub async fn login(&self) -> Result<(), CoreError> {
        let credentials = self
            .client
            .authenticate(
                &self.account.email,
                &self.account.password,
                &self.account.country,
            )
            .await?;
        info!(account = %credentials.account, "obtained cloud API credentials");
        *self.credentials.lock().await = Some(credentials);
        Ok(())
    }

    /// Log in until it works. Returns `false` if cancelled first.
    pub async fn ensure_credentials(&self, retry_delay: Duration, cancel: &CancellationToken) -> bool {
        while !self.has_credentials().await {
            if cancel.is_cancelled() {
                return false;
            }
            match self.login().await {
                Ok(()) => break,
                Err(e) => {
                    error!(error = %e, retry_secs = retry_delay.as_secs(), "cloud login failed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return false,
                        () = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
        true
    }

    /// Fetch the manifest as records keyed by device id.
    ///
    /// Unsupported models are skipped. A rejected login clears the cached
    /// credentials so the next poll authenticates again.
    pub async fn fetch(&self) -> Result<HashMap<String, DeviceRecord>, CoreError> {
        let Some(credentials) = self.credentials.lock().await.clone() else {
            return Err(CoreError::CredentialsExpired);
        };

        let entries = match self.client.fetch_inventory(&credentials).await {
            Ok(entries) => entries,
            Err(e) if e.is_auth_expired() => {
                warn!("cloud rejected API credentials, will log in again");
                *self.credentials.lock().await = None;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = HashMap::with_capacity(entries.len());
        for entry in &entries {
            match DeviceRecord::from_inventory(entry, &self.device_types) {
                Some(record) => {
                    records.insert(record.id.clone(), record);
                }
                None => warn!(
                    device_id = %entry.serial,
                    product_type = %entry.product_type,
                    "unsupported model, skipped"
                ),
            }
        }
        Ok(records)
    }
}

// ── Poll tasks ───────────────────────────────────────────────────

/// Reconcile the cloud inventory every `period`, logging in first if needed.
pub async fn inventory_poll_task(
    inventory: Arc<CloudInventory>,
    manager: Arc<SessionManager>,
    period: Duration,
    retry_delay: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !inventory.ensure_credentials(retry_delay, &cancel).await {
                    break;
                }
                match inventory.fetch().await {
                    Ok(snapshot) => {
                        let diff = manager.reconcile_inventory(snapshot).await;
                        debug!(
                            added = diff.added.len(),
                            missing = diff.missing.len(),
                            changed = diff.changed.len(),
                            "inventory reconciled"
                        );
                    }
                    Err(e) if e.is_auth_expired() => {
                        info!("cloud session expired, logging in on the next poll");
                    }
                    Err(e) => warn!(error = %e, "inventory poll failed"),
                }
            }
        }
    }
    debug!("inventory poller stopped");
}

/// Sweep the LAN for known devices every discovery interval.
pub async fn address_poll_task(
    discovery: Arc<Discovery>,
    manager: Arc<SessionManager>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(discovery.settings().interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let known: HashSet<String> =
                    manager.known_device_ids().await.into_iter().collect();
                let pass = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    pass = discovery.locate(&known) => pass,
                };
                match pass {
                    Ok(snapshot) => {
                        let diff = manager.reconcile_addresses(snapshot).await;
                        debug!(
                            added = diff.added.len(),
                            missing = diff.missing.len(),
                            changed = diff.changed.len(),
                            "addresses reconciled"
                        );
                    }
                    Err(e) => warn!(error = %e, "discovery pass failed"),
                }
            }
        }
    }
    debug!("address poller stopped");
}
