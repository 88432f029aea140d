//! Bridge between locally reachable air-treatment appliances and a
//! device-management platform.
//!
//! - **[`Bridge`]**: Facade that wires everything together:
//!   [`start()`](Bridge::start) spawns the cloud inventory poller, the LAN
//!   discovery poller and the command router;
//!   [`shutdown()`](Bridge::shutdown) stops them in that order and then
//!   closes every device session.
//!
//! - **[`SessionManager`]**: Single owner of device records, known
//!   addresses and running sessions. Both pollers reconcile their snapshots
//!   through it, under one lock.
//!
//! - **[`Session`]**: One task per device that owns the broker link and
//!   walks the connection state machine (see [`ConnectionState`]).
//!
//! - **[`CommandRouter`]**: Pulls commands from the [`Platform`], drops
//!   stale ones and dispatches the rest to [`service`] handlers.
//!
//! - **Seams**: [`Platform`], [`broker::Connector`],
//!   [`discovery::NetworkProbe`] and [`credential::CredentialDecryptor`]
//!   are traits; the test suites run the whole bridge in memory.

pub mod bridge;
pub mod broker;
pub mod config;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod model;
pub mod platform;
pub mod poller;
pub mod protocol;
pub mod reconcile;
pub mod router;
pub mod service;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, BridgeParts};
pub use config::{
    AccountCredentials, BridgeConfig, CloudSettings, DiscoverySettings, SessionSettings, TlsMode,
};
pub use error::{
    BrokerError, CoreError, CredentialError, DiscoveryError, PlatformError, ServiceError,
    SessionError,
};
pub use manager::{DeviceHandle, SessionManager};
pub use platform::Platform;
pub use poller::CloudInventory;
pub use reconcile::{Diff, diff};
pub use router::{CommandRouter, Routed};
pub use session::{ConnectionState, Session, SessionContext};

pub use model::{
    Command, CommandResponse, CompletionStrategy, DeviceClass, DeviceEvent, DeviceRecord,
    ModelDescriptor, ModelKind, NetworkLocation, SensorReadings, SensorSample, ServiceId,
};
