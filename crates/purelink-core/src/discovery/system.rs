// ── Probing with the host's own network stack ──

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::Command;

use super::NetworkProbe;
use crate::error::DiscoveryError;

/// Any routable address works; nothing is sent.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// [`NetworkProbe`] using the system `ping`, reverse DNS and TCP connects.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

#[async_trait]
impl NetworkProbe for SystemProbe {
    async fn local_address(&self, container: bool) -> Result<Ipv4Addr, DiscoveryError> {
        local_ipv4(container).await
    }

    async fn ping(&self, host: Ipv4Addr, timeout: Duration) -> bool {
        let wait = timeout.as_secs().max(1).to_string();
        let status = Command::new("ping")
            .args(["-c", "1", "-W", &wait])
            .arg(host.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // Allow the process itself a little headroom beyond the echo timeout.
        match tokio::time::timeout(timeout + Duration::from_secs(1), status).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    async fn reverse_name(&self, host: Ipv4Addr) -> Option<String> {
        let name = tokio::task::spawn_blocking(move || {
            dns_lookup::lookup_addr(&IpAddr::V4(host)).ok()
        })
        .await
        .ok()
        .flatten()?;

        // Resolvers without a PTR record echo the address back.
        (name != host.to_string()).then_some(name)
    }

    async fn probe_port(&self, host: Ipv4Addr, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((host, port));
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Address of this host on the LAN.
///
/// In a container the host network is invisible, so the address comes
/// from `HOST_IP`; otherwise it is the source address the kernel picks
/// for an outbound route.
pub async fn local_ipv4(container: bool) -> Result<Ipv4Addr, DiscoveryError> {
    let addr: IpAddr = if container {
        let raw = std::env::var("HOST_IP")
            .map_err(|_| DiscoveryError::LocalAddress("environment variable 'HOST_IP' not set".into()))?;
        raw.trim()
            .parse()
            .map_err(|_| DiscoveryError::LocalAddress(format!("invalid HOST_IP '{raw}'")))?
    } else {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| DiscoveryError::LocalAddress(e.to_string()))?;
        socket
            .connect(ROUTE_PROBE)
            .await
            .map_err(|e| DiscoveryError::LocalAddress(e.to_string()))?;
        socket
            .local_addr()
            .map_err(|e| DiscoveryError::LocalAddress(e.to_string()))?
            .ip()
    };

    match addr {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(v6) => Err(DiscoveryError::NotIpv4(v6.to_string())),
    }
}
