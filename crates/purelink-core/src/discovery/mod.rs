// ── Local network discovery ──
//
// Devices announce nothing we can rely on, so the bridge sweeps its own
// /24: ping every host, reverse-resolve the live ones and keep hosts whose
// short name is a known device serial and whose broker port answers.
// Both stages fan out over a fixed number of workers, each walking its
// own slice of the host list.

mod system;

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::DiscoverySettings;
use crate::error::DiscoveryError;
use crate::model::NetworkLocation;

pub use system::{SystemProbe, local_ipv4};

/// Network primitives used by a discovery pass.
#[async_trait]
pub trait NetworkProbe: Send + Sync + 'static {
    /// This host's IPv4 address on the LAN.
    async fn local_address(&self, container: bool) -> Result<Ipv4Addr, DiscoveryError>;

    /// `true` if the host answers an echo request within `timeout`.
    async fn ping(&self, host: Ipv4Addr, timeout: Duration) -> bool;

    /// Reverse DNS name of the host, if it has one.
    async fn reverse_name(&self, host: Ipv4Addr) -> Option<String>;

    /// `true` if a TCP connection to `port` succeeds within `timeout`.
    async fn probe_port(&self, host: Ipv4Addr, port: u16, timeout: Duration) -> bool;
}

/// Every host of the local /24 from `.2` to `.254`, except `local` itself.
pub fn host_range(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    (2..=254)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .filter(|host| *host != local)
        .collect()
}

/// First label of a host name, upper-cased: `nn2-eu-hka0001a.lan` → `NN2-EU-HKA0001A`.
pub fn short_name(hostname: &str) -> String {
    hostname
        .split('.')
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// Split `items` into at most `workers` contiguous, non-empty slices.
fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Runs discovery passes with a given probe.
pub struct Discovery {
    probe: Arc<dyn NetworkProbe>,
    settings: DiscoverySettings,
}

impl Discovery {
    pub fn new(probe: Arc<dyn NetworkProbe>, settings: DiscoverySettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Resolve the local address, then sweep its /24 for `known_ids`.
    pub async fn locate(
        &self,
        known_ids: &HashSet<String>,
    ) -> Result<HashMap<String, NetworkLocation>, DiscoveryError> {
        let local = self.probe.local_address(self.settings.container).await?;
        debug!(%local, known = known_ids.len(), "starting discovery pass");
        Ok(self.scan(local, known_ids).await)
    }

    /// One sweep of the /24 around `local`, keeping only `known_ids`.
    pub async fn scan(
        &self,
        local: Ipv4Addr,
        known_ids: &HashSet<String>,
    ) -> HashMap<String, NetworkLocation> {
        let alive = self.reachable_hosts(local).await;
        debug!(count = alive.len(), "reachable hosts");
        if alive.is_empty() || known_ids.is_empty() {
            return HashMap::new();
        }
        self.identify(alive, known_ids).await
    }

    async fn reachable_hosts(&self, local: Ipv4Addr) -> Vec<Ipv4Addr> {
        let timeout = self.settings.ping_timeout;
        let mut workers = JoinSet::new();

        for slice in partition(&host_range(local), self.settings.ping_workers) {
            let probe = Arc::clone(&self.probe);
            workers.spawn(async move {
                let mut alive = Vec::new();
                for host in slice {
                    if probe.ping(host, timeout).await {
                        alive.push(host);
                    }
                }
                alive
            });
        }

        let mut alive = Vec::new();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(hosts) => alive.extend(hosts),
                Err(e) => warn!(error = %e, "ping worker failed"),
            }
        }
        alive.sort();
        alive
    }

    async fn identify(
        &self,
        hosts: Vec<Ipv4Addr>,
        known_ids: &HashSet<String>,
    ) -> HashMap<String, NetworkLocation> {
        let port = self.settings.port;
        let timeout = self.settings.probe_timeout;
        let known = Arc::new(known_ids.clone());
        let mut workers = JoinSet::new();

        for slice in partition(&hosts, self.settings.probe_workers) {
            let probe = Arc::clone(&self.probe);
            let known = Arc::clone(&known);
            workers.spawn(async move {
                let mut found = Vec::new();
                for host in slice {
                    let Some(name) = probe.reverse_name(host).await else {
                        continue;
                    };
                    let id = short_name(&name);
                    if !known.contains(&id) {
                        continue;
                    }
                    if probe.probe_port(host, port, timeout).await {
                        found.push(NetworkLocation {
                            device_id: id,
                            address: IpAddr::V4(host),
                            port,
                        });
                    } else {
                        debug!(device_id = %id, %host, port, "broker port closed");
                    }
                }
                found
            });
        }

        let mut located = HashMap::new();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(found) => {
                    for location in found {
                        located.insert(location.device_id.clone(), location);
                    }
                }
                Err(e) => warn!(error = %e, "probe worker failed"),
            }
        }
        located
    }
}
