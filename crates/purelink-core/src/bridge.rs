// ── Bridge facade ──
//
// Wires the cloud poller, the discovery poller, the session manager and
// the command router together. Tasks run under child tokens of one root
// so shutdown can stop them in order: pollers, then the router, then
// every device session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Connector, MqttConnector};
use crate::config::BridgeConfig;
use crate::credential::{CredentialDecryptor, LocalCredentialCipher};
use crate::discovery::{Discovery, NetworkProbe, SystemProbe};
use crate::error::CoreError;
use crate::manager::SessionManager;
use crate::platform::Platform;
use crate::poller::{CloudInventory, address_poll_task, inventory_poll_task};
use crate::router::CommandRouter;

/// Collaborators a bridge runs against.
pub struct BridgeParts {
    pub platform: Arc<dyn Platform>,
    pub connector: Arc<dyn Connector>,
    pub decryptor: Arc<dyn CredentialDecryptor>,
    pub probe: Arc<dyn NetworkProbe>,
    pub inventory: CloudInventory,
}

/// The running bridge. Cheaply cloneable; clones share all state.
///
/// Once shut down it cannot be started again.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    manager: Arc<SessionManager>,
    router: Arc<CommandRouter>,
    inventory: Arc<CloudInventory>,
    discovery: Arc<Discovery>,
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    pollers: Option<(CancellationToken, Vec<JoinHandle<()>>)>,
    router: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Bridge {
    /// Bridge with the production MQTT connector, credential cipher,
    /// system network probe and cloud client.
    pub fn new(config: BridgeConfig, platform: Arc<dyn Platform>) -> Result<Self, CoreError> {
        let inventory = CloudInventory::from_settings(
            &config.cloud,
            config.account.clone(),
            config.device_types.clone(),
        )?;
        Ok(Self::with_parts(
            config,
            BridgeParts {
                platform,
                connector: Arc::new(MqttConnector),
                decryptor: Arc::new(LocalCredentialCipher),
                probe: Arc::new(SystemProbe),
                inventory,
            },
        ))
    }

    pub fn with_parts(config: BridgeConfig, parts: BridgeParts) -> Self {
        let manager = Arc::new(SessionManager::new(
            Arc::clone(&parts.platform),
            parts.connector,
            parts.decryptor,
            config.session.clone(),
        ));
        let router = Arc::new(CommandRouter::new(
            Arc::clone(&manager),
            parts.platform,
            config.session.max_command_age,
        ));
        let discovery = Arc::new(Discovery::new(parts.probe, config.discovery.clone()));

        Self {
            inner: Arc::new(BridgeInner {
                config,
                manager,
                router,
                inventory: Arc::new(parts.inventory),
                discovery,
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.inner.manager
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the pollers and the command router. A second call is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.pollers.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let cloud = &self.inner.config.cloud;
        let pollers = self.inner.cancel.child_token();
        let handles = vec![
            tokio::spawn(inventory_poll_task(
                Arc::clone(&self.inner.inventory),
                Arc::clone(&self.inner.manager),
                cloud.poll_interval,
                cloud.retry_delay,
                pollers.clone(),
            )),
            tokio::spawn(address_poll_task(
                Arc::clone(&self.inner.discovery),
                Arc::clone(&self.inner.manager),
                pollers.clone(),
            )),
        ];
        tasks.pollers = Some((pollers, handles));

        let router_cancel = self.inner.cancel.child_token();
        let router = Arc::clone(&self.inner.router);
        let token = router_cancel.clone();
        let handle = tokio::spawn(async move { router.run(token).await });
        tasks.router = Some((router_cancel, handle));

        info!("bridge started");
    }

    /// Stop pollers, then the router, then every session.
    pub async fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().await;

        if let Some((cancel, handles)) = tasks.pollers.take() {
            cancel.cancel();
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "poller task failed");
                }
            }
            debug!("pollers stopped");
        }

        if let Some((cancel, handle)) = tasks.router.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "router task failed");
            }
            debug!("router stopped");
        }

        self.inner.manager.shutdown().await;
        self.inner.cancel.cancel();
        info!("bridge stopped");
    }
}
