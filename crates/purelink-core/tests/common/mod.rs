// In-memory collaborators for integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::mpsc;

use purelink_core::broker::{BrokerOptions, Connector, EVENT_CHANNEL_SIZE, Link, LinkEvent};
use purelink_core::credential::CredentialDecryptor;
use purelink_core::discovery::NetworkProbe;
use purelink_core::{
    BrokerError, Command, CommandResponse, CredentialError, DeviceEvent, DeviceRecord,
    DiscoveryError, ModelKind, NetworkLocation, Platform, PlatformError, SessionSettings,
};

// ── Fixtures ─────────────────────────────────────────────────────

pub fn record(id: &str, name: &str) -> DeviceRecord {
    DeviceRecord {
        id: id.to_owned(),
        model: ModelKind::PureCoolLink,
        display_name: name.to_owned(),
        encrypted_credential: format!("pw-{id}"),
        tags: BTreeMap::from([("manufacturer".to_owned(), "Dyson".to_owned())]),
        device_type: None,
    }
}

pub fn location(id: &str, host: u8) -> NetworkLocation {
    NetworkLocation {
        device_id: id.to_owned(),
        address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, host)),
        port: 1883,
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        keepalive: Duration::from_secs(60),
        sensor_interval: Duration::from_secs(30),
        connect_timeout: Duration::from_secs(5),
        reconnect_delay: Duration::from_secs(2),
        max_command_age: Duration::from_secs(30),
    }
}

pub fn status_topic(id: &str) -> String {
    format!("475/{id}/status/current")
}

pub fn command_topic(id: &str) -> String {
    format!("475/{id}/command")
}

/// Poll `check` until it holds, letting paused time advance in between.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// ── Broker ───────────────────────────────────────────────────────

pub struct FakeLink {
    pub options: BrokerOptions,
    events: mpsc::Sender<LinkEvent>,
    subscribed: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Value)>>,
    disconnected: AtomicBool,
}

impl FakeLink {
    pub async fn deliver(&self, topic: &str, message: Value) {
        let payload = Bytes::from(serde_json::to_vec(&message).unwrap());
        let _ = self
            .events
            .send(LinkEvent::Message {
                topic: topic.to_owned(),
                payload,
            })
            .await;
    }

    pub async fn drop_connection(&self) {
        let _ = self
            .events
            .send(LinkEvent::Disconnected {
                reason: "connection reset".into(),
            })
            .await;
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }

    /// Published payloads whose `msg` equals `kind`.
    pub fn published(&self, kind: &str) -> Vec<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, body)| body["msg"] == kind)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn publish_topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.subscribed.lock().unwrap().push(topic.to_owned());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.is_disconnected() {
            return Err(BrokerError::Closed);
        }
        let body: Value = serde_json::from_slice(&payload).unwrap();
        self.published.lock().unwrap().push((topic.to_owned(), body));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out [`FakeLink`]s. Refuses while `reachable` is off.
pub struct FakeConnector {
    reachable: AtomicBool,
    attempts: AtomicUsize,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
        }
    }
}

impl FakeConnector {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn link(&self, index: usize) -> Arc<FakeLink> {
        Arc::clone(&self.links.lock().unwrap()[index])
    }

    /// Wait until the `index`-th link has subscribed, then return it.
    pub async fn wait_link(&self, index: usize) -> Arc<FakeLink> {
        eventually(|| {
            self.links
                .lock()
                .unwrap()
                .get(index)
                .is_some_and(|l| !l.subscribed().is_empty())
        })
        .await;
        self.link(index)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        options: &BrokerOptions,
    ) -> Result<(Arc<dyn Link>, mpsc::Receiver<LinkEvent>), BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectFailed {
                address: options.address.to_string(),
                port: options.port,
                reason: "connection refused".into(),
            });
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let link = Arc::new(FakeLink {
            options: options.clone(),
            events: tx,
            subscribed: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        });
        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok((link, rx))
    }
}

// ── Platform ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Add(String),
    Update(String, String),
    Delete(String),
    Connect(String),
    Disconnect(String),
    Response(CommandResponse),
    Event(DeviceEvent),
    Sync(Vec<String>),
}

pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    reject_add: Mutex<HashSet<String>>,
    reject_update: AtomicBool,
    commands_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    commands_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
    responses_open: tokio::sync::watch::Sender<bool>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            calls: Mutex::new(Vec::new()),
            reject_add: Mutex::new(HashSet::new()),
            reject_update: AtomicBool::new(false),
            commands_tx: Mutex::new(Some(tx)),
            commands_rx: tokio::sync::Mutex::new(rx),
            responses_open: tokio::sync::watch::Sender::new(true),
        }
    }
}

impl FakePlatform {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// While held, `send_response` blocks until released.
    pub fn hold_responses(&self, hold: bool) {
        self.responses_open.send_replace(!hold);
    }

    pub fn reject_add(&self, device_id: &str, reject: bool) {
        let mut set = self.reject_add.lock().unwrap();
        if reject {
            set.insert(device_id.to_owned());
        } else {
            set.remove(device_id);
        }
    }

    pub fn reject_updates(&self, reject: bool) {
        self.reject_update.store(reject, Ordering::SeqCst);
    }

    pub fn push_command(&self, command: Command) {
        if let Some(tx) = self.commands_tx.lock().unwrap().as_ref() {
            tx.send(command).unwrap();
        }
    }

    /// End the command stream; the router sees `Closed`.
    pub fn close_commands(&self) {
        self.commands_tx.lock().unwrap().take();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn add_device(&self, device: &DeviceRecord) -> Result<(), PlatformError> {
        if self.reject_add.lock().unwrap().contains(&device.id) {
            return Err(PlatformError::Rejected {
                operation: "add",
                device_id: device.id.clone(),
                reason: "quota exceeded".into(),
            });
        }
        self.record(Call::Add(device.id.clone()));
        Ok(())
    }

    async fn update_device(&self, device: &DeviceRecord) -> Result<(), PlatformError> {
        if self.reject_update.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected {
                operation: "update",
                device_id: device.id.clone(),
                reason: "read-only".into(),
            });
        }
        self.record(Call::Update(device.id.clone(), device.display_name.clone()));
        Ok(())
    }

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.record(Call::Delete(device_id.to_owned()));
        Ok(())
    }

    async fn connect_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.record(Call::Connect(device_id.to_owned()));
        Ok(())
    }

    async fn disconnect_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.record(Call::Disconnect(device_id.to_owned()));
        Ok(())
    }

    async fn receive_command(&self) -> Result<Command, PlatformError> {
        self.commands_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(PlatformError::Closed)
    }

    async fn send_response(&self, response: CommandResponse) -> Result<(), PlatformError> {
        let mut open = self.responses_open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        self.record(Call::Response(response));
        Ok(())
    }

    async fn emit_event(&self, event: DeviceEvent) -> Result<(), PlatformError> {
        self.record(Call::Event(event));
        Ok(())
    }

    async fn sync_hub(&self, devices: &[DeviceRecord]) -> Result<(), PlatformError> {
        self.record(Call::Sync(devices.iter().map(|d| d.id.clone()).collect()));
        Ok(())
    }
}

// ── Credentials ──────────────────────────────────────────────────

/// Treats the stored credential as plain text; `"garbage"` fails.
pub struct PlainDecryptor;

impl CredentialDecryptor for PlainDecryptor {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString, CredentialError> {
        if encrypted == "garbage" {
            return Err(CredentialError::Cipher);
        }
        Ok(SecretString::from(encrypted.to_owned()))
    }
}

// ── Network ──────────────────────────────────────────────────────

/// A scripted /24: which hosts answer, what they resolve to and which
/// have the broker port open.
#[derive(Default)]
pub struct FakeProbe {
    pub local: Option<Ipv4Addr>,
    pub alive: HashSet<Ipv4Addr>,
    pub names: HashMap<Ipv4Addr, String>,
    pub open: HashSet<Ipv4Addr>,
    pub pings: AtomicUsize,
}

impl FakeProbe {
    pub fn host(mut self, last: u8, name: &str, open: bool) -> Self {
        let addr = Ipv4Addr::new(192, 168, 1, last);
        self.alive.insert(addr);
        self.names.insert(addr, name.to_owned());
        if open {
            self.open.insert(addr);
        }
        self
    }
}

#[async_trait]
impl NetworkProbe for FakeProbe {
    async fn local_address(&self, _container: bool) -> Result<Ipv4Addr, DiscoveryError> {
        self.local
            .ok_or_else(|| DiscoveryError::LocalAddress("no route".into()))
    }

    async fn ping(&self, host: Ipv4Addr, _timeout: Duration) -> bool {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.alive.contains(&host)
    }

    async fn reverse_name(&self, host: Ipv4Addr) -> Option<String> {
        self.names.get(&host).cloned()
    }

    async fn probe_port(&self, host: Ipv4Addr, _port: u16, _timeout: Duration) -> bool {
        self.open.contains(&host)
    }
}
