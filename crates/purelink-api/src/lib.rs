// purelink-api: Async client for the appliance vendor cloud (login + device manifest)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::CloudClient;
pub use error::Error;
pub use models::{ApiCredentials, InventoryEntry};
pub use transport::{TlsMode, TransportConfig};
