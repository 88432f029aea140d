// ── Host platform boundary ──
//
// The device-management platform the bridge reports to. Every call can
// fail; callers log the failure and carry on, except `receive_command`,
// whose `Closed` error ends the command router.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::model::{Command, CommandResponse, DeviceEvent, DeviceRecord};

#[async_trait]
pub trait Platform: Send + Sync {
    /// Announce a newly owned device.
    async fn add_device(&self, device: &DeviceRecord) -> Result<(), PlatformError>;

    /// Push a changed display name.
    async fn update_device(&self, device: &DeviceRecord) -> Result<(), PlatformError>;

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError>;

    /// Mark a device online.
    async fn connect_device(&self, device_id: &str) -> Result<(), PlatformError>;

    /// Mark a device offline.
    async fn disconnect_device(&self, device_id: &str) -> Result<(), PlatformError>;

    /// Wait for the next inbound command.
    async fn receive_command(&self) -> Result<Command, PlatformError>;

    async fn send_response(&self, response: CommandResponse) -> Result<(), PlatformError>;

    async fn emit_event(&self, event: DeviceEvent) -> Result<(), PlatformError>;

    /// Replace the platform's view of the hub with the full device list.
    async fn sync_hub(&self, devices: &[DeviceRecord]) -> Result<(), PlatformError>;
}
