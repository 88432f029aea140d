// ── Session lifecycle manager ──
//
// Joins the two reconciled sources: the cloud inventory (which devices
// the account owns) and local discovery (where they live on the LAN). A
// session exists for a device once both are known. Every evaluation runs
// under one lock so two pollers can never start the same session twice.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::broker::Connector;
use crate::config::SessionSettings;
use crate::credential::CredentialDecryptor;
use crate::model::{DeviceRecord, NetworkLocation};
use crate::platform::Platform;
use crate::reconcile::{self, Diff};
use crate::session::{ConnectionState, Session, SessionContext};

/// A known device and its session, if one is running.
#[derive(Clone)]
pub struct DeviceHandle {
    pub record: DeviceRecord,
    pub session: Option<Arc<Session>>,
}

/// Owns every device record, known address and running session.
pub struct SessionManager {
    platform: Arc<dyn Platform>,
    connector: Arc<dyn Connector>,
    decryptor: Arc<dyn CredentialDecryptor>,
    settings: SessionSettings,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    inventory: HashMap<String, DeviceRecord>,
    addresses: HashMap<String, NetworkLocation>,
    sessions: HashMap<String, Arc<Session>>,
}

impl SessionManager {
    pub fn new(
        platform: Arc<dyn Platform>,
        connector: Arc<dyn Connector>,
        decryptor: Arc<dyn CredentialDecryptor>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            platform,
            connector,
            decryptor,
            settings,
            state: Mutex::new(ManagerState::default()),
        }
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Apply a fresh cloud inventory snapshot.
    ///
    /// Devices the platform refuses to add are not recorded, so they show
    /// up as added again on the next cycle.
    pub async fn reconcile_inventory(&self, snapshot: HashMap<String, DeviceRecord>) -> Diff<String> {
        let mut state = self.state.lock().await;
        let diff = reconcile::diff(&state.inventory, &snapshot, DeviceRecord::same_listing);

        for id in &diff.missing {
            if let Some(session) = state.sessions.remove(id) {
                session.stop().await;
            }
            if let Err(e) = self.platform.delete_device(id).await {
                error!(device_id = %id, error = %e, "platform delete failed");
            }
            state.inventory.remove(id);
            info!(device_id = %id, "device removed from inventory");
        }

        for id in &diff.added {
            let Some(record) = snapshot.get(id) else {
                continue;
            };
            if let Err(e) = self.platform.add_device(record).await {
                warn!(device_id = %id, error = %e, "platform add failed, retrying next cycle");
                continue;
            }
            info!(device_id = %id, name = %record.display_name, "device added");
            state.inventory.insert(id.clone(), record.clone());

            if !state.sessions.contains_key(id) {
                if let Some(location) = state.addresses.get(id).cloned() {
                    if let Some(session) = self.start_session(record, location) {
                        state.sessions.insert(id.clone(), session);
                    }
                }
            }
        }

        for id in &diff.changed {
            let Some(new_name) = snapshot.get(id).map(|r| r.display_name.clone()) else {
                continue;
            };
            let Some(record) = state.inventory.get_mut(id) else {
                continue;
            };
            let old_name = std::mem::replace(&mut record.display_name, new_name);
            match self.platform.update_device(record).await {
                Ok(()) => {
                    info!(device_id = %id, from = %old_name, to = %record.display_name, "device renamed");
                }
                Err(e) => {
                    warn!(device_id = %id, error = %e, "platform update failed, keeping old name");
                    record.display_name = old_name;
                }
            }
        }

        if !diff.is_empty() {
            let mut devices: Vec<DeviceRecord> = state.inventory.values().cloned().collect();
            devices.sort_by(|a, b| a.id.cmp(&b.id));
            if let Err(e) = self.platform.sync_hub(&devices).await {
                error!(error = %e, "hub sync failed");
            }
        }

        diff
    }

    /// Apply a fresh local discovery snapshot.
    pub async fn reconcile_addresses(
        &self,
        snapshot: HashMap<String, NetworkLocation>,
    ) -> Diff<String> {
        let mut state = self.state.lock().await;
        let diff = reconcile::diff(&state.addresses, &snapshot, |a, b| a == b);

        for id in &diff.missing {
            info!(device_id = %id, "device no longer found on the network");
        }

        for id in diff.added.iter().chain(&diff.changed) {
            let Some(location) = snapshot.get(id) else {
                continue;
            };
            info!(device_id = %id, address = %location.address, "device located");

            if let Some(session) = state.sessions.get(id) {
                session.relocate(location.clone());
            } else if let Some(record) = state.inventory.get(id) {
                if let Some(session) = self.start_session(record, location.clone()) {
                    state.sessions.insert(id.clone(), session);
                }
            } else {
                debug!(device_id = %id, "address known before inventory");
            }
        }

        state.addresses = snapshot;
        diff
    }

    fn start_session(&self, record: &DeviceRecord, location: NetworkLocation) -> Option<Arc<Session>> {
        let password = match self.decryptor.decrypt(&record.encrypted_credential) {
            Ok(password) => password,
            Err(e) => {
                error!(device_id = %record.id, error = %e, "could not decrypt broker credential");
                return None;
            }
        };

        Some(Arc::new(Session::start(SessionContext {
            device: record.clone(),
            location,
            password,
            settings: self.settings.clone(),
            connector: Arc::clone(&self.connector),
            platform: Arc::clone(&self.platform),
        })))
    }

    // ── Queries ──────────────────────────────────────────────────

    pub async fn lookup(&self, device_id: &str) -> Option<DeviceHandle> {
        let state = self.state.lock().await;
        let record = state.inventory.get(device_id)?.clone();
        let session = state.sessions.get(device_id).cloned();
        Some(DeviceHandle { record, session })
    }

    /// Ids of every device in the accepted inventory.
    pub async fn known_device_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state.inventory.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Connection state per running session.
    pub async fn session_states(&self) -> Vec<(String, ConnectionState)> {
        let state = self.state.lock().await;
        let mut states: Vec<(String, ConnectionState)> = state
            .sessions
            .iter()
            .map(|(id, s)| (id.clone(), s.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Stop every session. Records and addresses are kept.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut state = self.state.lock().await;
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        debug!(count = sessions.len(), "stopping sessions");
        join_all(sessions.iter().map(|s| s.stop())).await;
    }
}
