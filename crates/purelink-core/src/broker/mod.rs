// ── Publish/subscribe link abstraction ──
//
// A session only needs connect, subscribe, publish and disconnect. The
// link hands everything it receives (messages and the terminal
// disconnect) to the session over an mpsc channel, so the session's own
// task is the only place device state is mutated.

mod mqtt;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::error::BrokerError;

pub use mqtt::MqttConnector;

/// Capacity of the per-link event channel.
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Everything needed to open one authenticated link to a device broker.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub client_id: String,
    pub address: IpAddr,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub keepalive: Duration,
    pub connect_timeout: Duration,
}

/// What a live link reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Message { topic: String, payload: Bytes },
    /// The link is gone; no further events follow.
    Disconnected { reason: String },
}

/// An established broker connection.
#[async_trait]
pub trait Link: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Close the link. Safe to call more than once.
    async fn disconnect(&self);
}

/// Opens links. Returns only once the broker accepted the connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        options: &BrokerOptions,
    ) -> Result<(Arc<dyn Link>, mpsc::Receiver<LinkEvent>), BrokerError>;
}
