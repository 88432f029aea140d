// ── MQTT link built on rumqttc ──

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BrokerOptions, Connector, EVENT_CHANNEL_SIZE, Link, LinkEvent};
use crate::error::BrokerError;

const REQUEST_CHANNEL_SIZE: usize = 16;

/// [`Connector`] for the appliances' on-board MQTT brokers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(
        &self,
        options: &BrokerOptions,
    ) -> Result<(Arc<dyn Link>, mpsc::Receiver<LinkEvent>), BrokerError> {
        let mut mqtt_options = MqttOptions::new(
            options.client_id.clone(),
            options.address.to_string(),
            options.port,
        );
        mqtt_options
            .set_credentials(
                options.username.clone(),
                options.password.expose_secret().to_owned(),
            )
            .set_keep_alive(options.keepalive)
            .set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_SIZE);

        match tokio::time::timeout(options.connect_timeout, wait_for_connack(&mut event_loop))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                return Err(BrokerError::ConnectFailed {
                    address: options.address.to_string(),
                    port: options.port,
                    reason,
                });
            }
            Err(_) => {
                return Err(BrokerError::ConnectTimeout {
                    timeout_secs: options.connect_timeout.as_secs(),
                });
            }
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        tokio::spawn(pump(event_loop, tx, cancel.clone()));

        let link: Arc<dyn Link> = Arc::new(MqttLink { client, cancel });
        Ok((link, rx))
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), String> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("connection refused: {:?}", ack.code))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Forward incoming publishes until the connection ends, then report why.
async fn pump(mut event_loop: EventLoop, tx: mpsc::Sender<LinkEvent>, cancel: CancellationToken) {
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break "closed by client".to_owned(),
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, "broker message");
                    let event = LinkEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => break "broker sent disconnect".to_owned(),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break "closed by client".to_owned(),
                Ok(_) => {}
                Err(e) => break e.to_string(),
            },
        }
    };

    let _ = tx.send(LinkEvent::Disconnected { reason }).await;
}

struct MqttLink {
    client: AsyncClient,
    cancel: CancellationToken,
}

#[async_trait]
impl Link for MqttLink {
    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        // The pump exits once the DISCONNECT packet goes out.
        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "mqtt disconnect not queued, dropping connection");
            self.cancel.cancel();
        }
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
