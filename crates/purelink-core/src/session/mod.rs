// ── Per-device protocol session ──
//
// One session per reachable, owned device. A single task owns the broker
// link and walks the connection state machine; every broker event arrives
// over the link's channel and is applied in order by that task. A second
// task, started after the first successful connect, periodically asks the
// device for sensor data while monitoring is on.

mod cache;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{BrokerOptions, Connector, Link, LinkEvent};
use crate::config::SessionSettings;
use crate::error::{BrokerError, SessionError};
use crate::model::{DeviceEvent, DeviceRecord, ModelKind, NetworkLocation, SensorSample};
use crate::platform::Platform;
use crate::protocol::{self, Inbound, Topics};

use cache::StateCache;

/// Keys the firmware rejects in a `STATE-SET`.
const EXCLUDED_KEYS: &[&str] = &["filf", "fnst", "ercd", "wacd"];

/// Keys the firmware requires in a `STATE-SET` but omits from its reports.
const REQUIRED_DEFAULTS: &[(&str, &str)] = &[("sltm", "STET"), ("rstf", "STET")];

/// Event service id for relayed sensor samples.
pub const PUSH_READINGS_SERVICE: &str = "pushReadings";

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingInitialState,
    Ready,
    Reconnecting,
    Closed,
}

// ── Session ──────────────────────────────────────────────────────

/// Everything a session needs to run.
pub struct SessionContext {
    pub device: DeviceRecord,
    pub location: NetworkLocation,
    /// Decrypted broker password.
    pub password: SecretString,
    pub settings: SessionSettings,
    pub connector: Arc<dyn Connector>,
    pub platform: Arc<dyn Platform>,
}

/// Handle to a running session.
pub struct Session {
    shared: Arc<Shared>,
    location: watch::Sender<NetworkLocation>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    device_id: String,
    model: ModelKind,
    topics: Topics,
    password: SecretString,
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    platform: Arc<dyn Platform>,
    state: watch::Sender<ConnectionState>,
    cache: StateCache,
    link: StdMutex<Option<Arc<dyn Link>>>,
    last_sample: StdMutex<Option<SensorSample>>,
    /// Set once the platform has been told about the current outage.
    /// Cleared on every successful connect.
    disconnect_notified: AtomicBool,
    cancel: CancellationToken,
}

/// Why the serving loop of one connection ended.
enum Outcome {
    Stopped,
    Lost(String),
    Relocated,
}

impl Session {
    /// Spawn the session task. It connects immediately.
    pub fn start(ctx: SessionContext) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (location, location_rx) = watch::channel(ctx.location);

        let shared = Arc::new(Shared {
            topics: Topics::new(ctx.device.model_number(), &ctx.device.id),
            device_id: ctx.device.id,
            model: ctx.device.model,
            password: ctx.password,
            settings: ctx.settings,
            connector: ctx.connector,
            platform: ctx.platform,
            state,
            cache: StateCache::new(),
            link: StdMutex::new(None),
            last_sample: StdMutex::new(None),
            disconnect_notified: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });

        let task = tokio::spawn(run(Arc::clone(&shared), location_rx));

        Self {
            shared,
            location,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    pub fn model(&self) -> ModelKind {
        self.shared.model
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn location(&self) -> NetworkLocation {
        self.location.borrow().clone()
    }

    /// Copy of the cached device state, `None` until the first report.
    pub fn device_state(&self) -> Option<HashMap<String, String>> {
        let snapshot = self.shared.cache.snapshot();
        (!snapshot.is_empty()).then_some(snapshot)
    }

    /// Most recent relayed sensor sample.
    pub fn last_sample(&self) -> Option<SensorSample> {
        self.shared
            .last_sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn monitoring(&self) -> bool {
        self.shared.monitoring()
    }

    /// Ask the device to apply `partial` on top of its last known state.
    pub async fn set_state(&self, partial: HashMap<String, String>) -> Result<(), SessionError> {
        self.shared.set_state(partial).await
    }

    /// Point the session at a new address. A live connection is dropped
    /// and re-established there; the cached state is kept.
    pub fn relocate(&self, location: NetworkLocation) {
        self.location.send_if_modified(|current| {
            if *current == location {
                false
            } else {
                *current = location;
                true
            }
        });
    }

    /// Close the link and wait for the session's tasks. Idempotent.
    pub async fn stop(&self) {
        self.shared.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(device_id = %self.shared.device_id, error = %e, "session task failed");
            }
        }
    }
}

// ── Run loop ─────────────────────────────────────────────────────

async fn run(shared: Arc<Shared>, mut location: watch::Receiver<NetworkLocation>) {
    info!(device_id = %shared.device_id, "starting session");
    let mut sensor_task: Option<JoinHandle<()>> = None;
    let mut reconnecting = false;

    loop {
        shared.transition(if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });

        let target = location.borrow_and_update().clone();
        let attempt = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            result = shared.connect(&target) => result,
        };

        let (link, events) = match attempt {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    device_id = %shared.device_id,
                    address = %target.address,
                    port = target.port,
                    error = %e,
                    "could not connect"
                );
                if shared.backoff().await {
                    continue;
                }
                break;
            }
        };

        if let Err(e) = shared.open(link.as_ref()).await {
            warn!(device_id = %shared.device_id, error = %e, "could not request device state");
            link.disconnect().await;
            if shared.backoff().await {
                continue;
            }
            break;
        }

        info!(device_id = %shared.device_id, address = %target.address, "connected");
        shared.disconnect_notified.store(false, Ordering::SeqCst);
        shared.set_link(Some(Arc::clone(&link)));
        shared.transition(ConnectionState::AwaitingInitialState);

        if sensor_task.is_none() {
            sensor_task = Some(tokio::spawn(sensor_trigger(Arc::clone(&shared))));
        }

        let outcome = shared.serve(events, &mut location).await;
        shared.set_link(None);
        link.disconnect().await;

        match outcome {
            Outcome::Stopped => break,
            Outcome::Lost(reason) => {
                warn!(device_id = %shared.device_id, %reason, "disconnected unexpectedly");
                reconnecting = true;
                shared.transition(ConnectionState::Reconnecting);
                shared.notify_disconnected().await;
                if !shared.backoff().await {
                    break;
                }
            }
            Outcome::Relocated => {
                info!(device_id = %shared.device_id, "address changed, reconnecting");
                reconnecting = true;
                shared.transition(ConnectionState::Reconnecting);
                shared.notify_disconnected().await;
            }
        }
    }

    shared.cancel.cancel();
    shared.notify_disconnected().await;
    shared.transition(ConnectionState::Closed);

    if let Some(task) = sensor_task {
        let _ = task.await;
    }
    info!(device_id = %shared.device_id, "session closed");
}

/// Request sensor data every interval while `Ready` with monitoring on.
/// Leaving `Ready` restarts the period, discarding the pending tick.
async fn sensor_trigger(shared: Arc<Shared>) {
    debug!(device_id = %shared.device_id, "starting sensor trigger");
    let mut state = shared.state.subscribe();
    let mut interval = tokio::time::interval(shared.settings.sensor_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if *state.borrow_and_update() != ConnectionState::Ready {
                    interval.reset();
                }
            }
            _ = interval.tick() => {
                if *state.borrow() == ConnectionState::Ready && shared.monitoring() {
                    shared.request_sensor_data().await;
                }
            }
        }
    }
    debug!(device_id = %shared.device_id, "sensor trigger stopped");
}

impl Shared {
    fn transition(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(device_id = %self.device_id, from = %prev, to = %next, "session state");
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_link(&self, link: Option<Arc<dyn Link>>) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = link;
    }

    fn current_link(&self) -> Option<Arc<dyn Link>> {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn monitoring(&self) -> bool {
        self.cache.get("rhtm").as_deref() == Some("ON")
            || matches!(self.cache.get("fmod").as_deref(), Some("FAN" | "AUTO"))
    }

    async fn connect(
        &self,
        target: &NetworkLocation,
    ) -> Result<(Arc<dyn Link>, mpsc::Receiver<LinkEvent>), BrokerError> {
        let options = BrokerOptions {
            client_id: format!("purelink-{}", self.device_id),
            address: target.address,
            port: target.port,
            username: self.device_id.clone(),
            password: self.password.clone(),
            keepalive: self.settings.keepalive,
            connect_timeout: self.settings.connect_timeout,
        };

        tokio::time::timeout(self.settings.connect_timeout, self.connector.connect(&options))
            .await
            .unwrap_or_else(|_| {
                Err(BrokerError::ConnectTimeout {
                    timeout_secs: self.settings.connect_timeout.as_secs(),
                })
            })
    }

    /// Subscribe to status reports and ask for a full state snapshot.
    async fn open(&self, link: &dyn Link) -> Result<(), BrokerError> {
        link.subscribe(&self.topics.status).await?;
        link.publish(&self.topics.command, protocol::request_current_state(Utc::now()))
            .await
    }

    /// Returns `false` if the session was stopped while waiting.
    async fn backoff(&self) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(self.settings.reconnect_delay) => true,
        }
    }

    async fn serve(
        &self,
        mut events: mpsc::Receiver<LinkEvent>,
        location: &mut watch::Receiver<NetworkLocation>,
    ) -> Outcome {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Outcome::Stopped,
                changed = location.changed() => {
                    // Sender gone means the handle was dropped.
                    return if changed.is_ok() { Outcome::Relocated } else { Outcome::Stopped };
                }
                event = events.recv() => match event {
                    Some(LinkEvent::Message { topic, payload }) => {
                        self.handle_message(&topic, &payload).await;
                    }
                    Some(LinkEvent::Disconnected { reason }) => return Outcome::Lost(reason),
                    None => return Outcome::Lost("link closed".to_owned()),
                },
            }
        }
    }

    async fn handle_message(&self, topic: &str, payload: &[u8]) {
        if topic != self.topics.status {
            debug!(device_id = %self.device_id, topic, "message on unexpected topic");
            return;
        }

        let message = match protocol::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(device_id = %self.device_id, error = %e, "malformed message");
                return;
            }
        };

        match (message, self.current_state()) {
            (Inbound::CurrentState(values), ConnectionState::AwaitingInitialState) => {
                if self.cache.is_empty() {
                    self.cache.update(values);
                }
                self.transition(ConnectionState::Ready);
                info!(device_id = %self.device_id, "device ready");
                if let Err(e) = self.platform.connect_device(&self.device_id).await {
                    warn!(device_id = %self.device_id, error = %e, "platform connect failed");
                }
            }
            (
                Inbound::CurrentState(values) | Inbound::StateChange(values),
                ConnectionState::Ready,
            ) => self.cache.update(values),
            (Inbound::SensorData(sample), ConnectionState::Ready) => self.relay(sample).await,
            (Inbound::Other(kind), _) => {
                debug!(device_id = %self.device_id, msg = %kind, "unhandled message");
            }
            (_, state) => {
                debug!(device_id = %self.device_id, %state, "message ignored before initial state");
            }
        }
    }

    /// Forward a sensor sample if monitoring is on and every sensor is warm.
    async fn relay(&self, mut sample: SensorSample) {
        if !self.monitoring() {
            debug!(device_id = %self.device_id, "monitoring off, sample dropped");
            return;
        }
        if sample.has_sentinel() {
            debug!(device_id = %self.device_id, "sensors not ready, sample dropped");
            return;
        }
        sample.strip_echoes();

        *self
            .last_sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sample.clone());

        if !self.model.pushes_readings() {
            return;
        }

        let payload = match serde_json::to_value(sample.readings()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(device_id = %self.device_id, error = %e, "could not encode readings");
                return;
            }
        };
        let event = DeviceEvent {
            device_id: self.device_id.clone(),
            service_id: PUSH_READINGS_SERVICE.to_owned(),
            payload,
        };
        if let Err(e) = self.platform.emit_event(event).await {
            warn!(device_id = %self.device_id, error = %e, "could not push readings");
        }
    }

    async fn request_sensor_data(&self) {
        let Some(link) = self.current_link() else {
            return;
        };
        if let Err(e) = link
            .publish(&self.topics.command, protocol::request_sensor_data(Utc::now()))
            .await
        {
            warn!(device_id = %self.device_id, error = %e, "sensor request failed");
        }
    }

    async fn set_state(&self, partial: HashMap<String, String>) -> Result<(), SessionError> {
        if self.current_state() != ConnectionState::Ready {
            return Err(SessionError::NotConnected {
                device_id: self.device_id.clone(),
            });
        }

        let mut data = self.cache.snapshot();
        if data.is_empty() {
            return Err(SessionError::StateUnknown {
                device_id: self.device_id.clone(),
            });
        }

        for (key, value) in REQUIRED_DEFAULTS {
            if !partial.contains_key(*key) {
                data.insert((*key).to_owned(), (*value).to_owned());
            }
        }
        data.extend(partial);
        for key in EXCLUDED_KEYS {
            data.remove(*key);
        }

        let link = self.current_link().ok_or_else(|| SessionError::NotConnected {
            device_id: self.device_id.clone(),
        })?;

        link.publish(&self.topics.command, protocol::state_set(Utc::now(), &data))
            .await
            .map_err(|e| SessionError::PublishFailed {
                device_id: self.device_id.clone(),
                reason: e.to_string(),
            })?;

        debug!(device_id = %self.device_id, "state set published");
        Ok(())
    }

    async fn notify_disconnected(&self) {
        if self.disconnect_notified.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.platform.disconnect_device(&self.device_id).await {
            warn!(device_id = %self.device_id, error = %e, "platform disconnect failed");
        }
    }
}
