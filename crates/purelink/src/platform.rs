//! Platform adapter speaking JSON lines over a byte stream.
//!
//! Inbound: one `Command` object per line. Outbound: every platform call
//! becomes one object tagged with `type`. In `run` mode the streams are
//! the process's stdin and stdout.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tracing::warn;

use purelink_core::{
    Command, CommandResponse, DeviceEvent, DeviceRecord, Platform, PlatformError,
};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    AddDevice { device: &'a DeviceRecord },
    UpdateDevice { device: &'a DeviceRecord },
    DeleteDevice { device_id: &'a str },
    ConnectDevice { device_id: &'a str },
    DisconnectDevice { device_id: &'a str },
    Response(&'a CommandResponse),
    Event(&'a DeviceEvent),
    SyncHub { devices: &'a [DeviceRecord] },
}

pub struct StdioPlatform<R, W> {
    commands: Mutex<Lines<BufReader<R>>>,
    out: Mutex<W>,
}

impl StdioPlatform<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioPlatform<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            commands: Mutex::new(BufReader::new(reader).lines()),
            out: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.out.into_inner()
    }

    async fn write(&self, message: &Outbound<'_>) -> Result<(), PlatformError> {
        let mut line = serde_json::to_vec(message).map_err(|e| PlatformError::Io(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await.map_err(io_error)?;
        out.flush().await.map_err(io_error)
    }
}

fn io_error(err: std::io::Error) -> PlatformError {
    PlatformError::Io(err.to_string())
}

#[async_trait]
impl<R, W> Platform for StdioPlatform<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn add_device(&self, device: &DeviceRecord) -> Result<(), PlatformError> {
        self.write(&Outbound::AddDevice { device }).await
    }

    async fn update_device(&self, device: &DeviceRecord) -> Result<(), PlatformError> {
        self.write(&Outbound::UpdateDevice { device }).await
    }

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.write(&Outbound::DeleteDevice { device_id }).await
    }

    async fn connect_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.write(&Outbound::ConnectDevice { device_id }).await
    }

    async fn disconnect_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.write(&Outbound::DisconnectDevice { device_id }).await
    }

    async fn receive_command(&self) -> Result<Command, PlatformError> {
        let mut lines = self.commands.lock().await;
        loop {
            let Some(line) = lines.next_line().await.map_err(io_error)? else {
                return Err(PlatformError::Closed);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(line) {
                Ok(command) => return Ok(command),
                Err(e) => warn!(error = %e, "dropping malformed command line"),
            }
        }
    }

    async fn send_response(&self, response: CommandResponse) -> Result<(), PlatformError> {
        self.write(&Outbound::Response(&response)).await
    }

    async fn emit_event(&self, event: DeviceEvent) -> Result<(), PlatformError> {
        self.write(&Outbound::Event(&event)).await
    }

    async fn sync_hub(&self, devices: &[DeviceRecord]) -> Result<(), PlatformError> {
        self.write(&Outbound::SyncHub { devices }).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn lines(out: &[u8]) -> Vec<Value> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn commands_are_read_line_by_line() {
        let input: &[u8] = b"\n\
            not json\n\
            {\"device_id\":\"A\",\"service_id\":\"setPower\",\"payload\":\"{\\\"power\\\":true}\",\
             \"timestamp\":\"2026-01-01T00:00:00Z\",\"correlation_id\":\"c-1\",\
             \"completion_strategy\":\"pessimistic\"}\n";
        let platform = StdioPlatform::new(input, Vec::new());

        let command = platform.receive_command().await.unwrap();
        assert_eq!(command.device_id, "A");
        assert_eq!(command.payload.as_deref(), Some(r#"{"power":true}"#));
        assert_eq!(
            command.completion_strategy,
            purelink_core::CompletionStrategy::Pessimistic
        );

        assert_eq!(
            platform.receive_command().await.unwrap_err(),
            PlatformError::Closed
        );
    }

    #[tokio::test]
    async fn outbound_calls_are_tagged_lines() {
        let platform = StdioPlatform::new(&b""[..], Vec::new());
        platform.connect_device("A").await.unwrap();
        platform
            .send_response(CommandResponse {
                device_id: "A".into(),
                service_id: "setPower".into(),
                correlation_id: "c-1".into(),
                payload: json!({"status": 0}),
            })
            .await
            .unwrap();
        platform.sync_hub(&[]).await.unwrap();

        let out = lines(&platform.into_writer());
        assert_eq!(out[0], json!({"type": "connect_device", "device_id": "A"}));
        assert_eq!(out[1]["type"], "response");
        assert_eq!(out[1]["correlation_id"], "c-1");
        assert_eq!(out[1]["payload"], json!({"status": 0}));
        assert_eq!(out[2], json!({"type": "sync_hub", "devices": []}));
    }
}
