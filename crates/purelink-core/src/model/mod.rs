// ── Domain model ──

pub mod command;
pub mod device;
pub mod kind;
pub mod readings;

pub use command::{Command, CommandResponse, CompletionStrategy, DeviceEvent};
pub use device::{DeviceRecord, NetworkLocation};
pub use kind::{DeviceClass, ModelDescriptor, ModelKind, ServiceId};
pub use readings::{SensorReadings, SensorSample};
