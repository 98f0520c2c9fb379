//! MQTT session adapter over rumqttc
//!
//! [`MqttTransport`] owns the rumqttc client and drives its event loop in a
//! spawned task. The pump routes inbound publishes to the control-message
//! channel and PubAcks to the delivery-receipt channel, decoupling delivery
//! timing from processing.

use super::connection::{configure_mqtt_options, route_event, EventRoute};
use crate::config::MqttSection;
use crate::transport::{
    ConnectionState, ControlMessage, DeliveryReceipts, QosLevel, Transport, TransportError,
};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::AsyncClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 16;
const CONTROL_CHANNEL_CAPACITY: usize = 32;
const RECEIPT_CHANNEL_CAPACITY: usize = 8;

/// Inbound side of a broker session: control messages and delivery receipts
pub struct InboundChannels {
    pub control: mpsc::Receiver<ControlMessage>,
    pub receipts: DeliveryReceipts,
}

/// Connected publish/subscribe session over MQTT
pub struct MqttTransport {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Option<JoinHandle<()>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MqttTransport {
    /// Create the session and start the event pump. The session is usable
    /// for publishing only after [`MqttTransport::wait_connected`] resolves.
    pub fn new(
        client_id: &str,
        config: &MqttSection,
    ) -> Result<(Self, InboundChannels), TransportError> {
        let options = configure_mqtt_options(client_id, config)?;
        let (client, mut event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (receipt_tx, receipt_rx) = mpsc::channel(RECEIPT_CHANNEL_CAPACITY);

        let subscriptions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let pump_client = client.clone();
        let pump_subscriptions = subscriptions.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("shutdown signal received, stopping event pump");
                            break;
                        }
                    }
                    polled = event_loop.poll() => match polled {
                        Ok(event) => match route_event(&event) {
                            EventRoute::ConnectionAcknowledged => {
                                let _ = state_tx.send(ConnectionState::Connected);
                                let topics = pump_subscriptions
                                    .lock()
                                    .map(|guard| guard.clone())
                                    .unwrap_or_default();
                                for topic in topics {
                                    if let Err(e) =
                                        pump_client.subscribe(&topic, QoS::AtLeastOnce).await
                                    {
                                        warn!(topic, "re-subscription failed: {e}");
                                    }
                                }
                            }
                            EventRoute::Inbound(msg) => {
                                if control_tx.try_send(msg).is_err() {
                                    warn!("control channel full, dropping inbound message");
                                }
                            }
                            EventRoute::Receipt(receipt) => {
                                if receipt_tx.try_send(receipt).is_err() {
                                    warn!(
                                        pid = receipt.pid,
                                        "receipt channel full, dropping delivery receipt"
                                    );
                                }
                            }
                            EventRoute::Disconnected => {
                                let _ = state_tx.send(ConnectionState::Disconnected);
                                info!("broker closed the session");
                            }
                            EventRoute::Infrastructure | EventRoute::Outgoing => {}
                        },
                        Err(e) => {
                            let _ = state_tx.send(ConnectionState::Disconnected);
                            warn!("event loop error: {e}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        });

        let transport = MqttTransport {
            client,
            state_rx,
            shutdown_tx,
            event_loop_handle: Some(handle),
            subscriptions,
        };
        let channels = InboundChannels {
            control: control_rx,
            receipts: DeliveryReceipts::new(receipt_rx),
        };
        Ok((transport, channels))
    }

    /// Create the session and block until the broker confirms it with a
    /// ConnAck, bounded by the configured connect timeout.
    pub async fn connect(
        client_id: &str,
        config: &MqttSection,
    ) -> Result<(Self, InboundChannels), TransportError> {
        let (transport, channels) = Self::new(client_id, config)?;
        transport
            .wait_connected(Duration::from_secs(config.connect_timeout_secs))
            .await?;
        Ok((transport, channels))
    }

    /// Block until the session reaches Connected or the timeout elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut state_rx = self.state_rx.clone();
        let wait = async {
            loop {
                if *state_rx.borrow() == ConnectionState::Connected {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::Connect("state channel closed".into()));
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout(timeout)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(TransportError::NotConnected { state });
        }
        Ok(())
    }

    /// Close the session and stop the event pump.
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        let _ = self.shutdown_tx.send(true);

        if self.is_connected() {
            self.client
                .disconnect()
                .await
                .map_err(|e| TransportError::Connect(Box::new(e)))?;
        }

        if let Some(handle) = self.event_loop_handle.take() {
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("event pump did not stop in time, aborting");
            }
        }
        info!("mqtt session closed");
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.check_connected()?;

        let qos = match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        };
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| TransportError::Publish(Box::new(e)))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.check_connected()?;

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe(Box::new(e)))?;

        // Remember the topic so the pump can re-subscribe after a reconnect
        if let Ok(mut guard) = self.subscriptions.lock() {
            if !guard.iter().any(|t| t == topic) {
                guard.push(topic.to_string());
            }
        }
        debug!(topic, "subscribed");
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_section() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn new_session_starts_in_connecting_state() {
        let (transport, _channels) = MqttTransport::new("test-node", &test_mqtt_section()).unwrap();
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn publish_fails_before_connack() {
        let (transport, _channels) = MqttTransport::new("test-node", &test_mqtt_section()).unwrap();
        let result = transport
            .publish("node/env", b"{}".to_vec(), QosLevel::AtMostOnce, false)
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn subscribe_fails_before_connack() {
        let (transport, _channels) = MqttTransport::new("test-node", &test_mqtt_section()).unwrap();
        let result = transport.subscribe("node/led").await;
        assert!(matches!(result, Err(TransportError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn wait_connected_times_out_without_broker() {
        let mut config = test_mqtt_section();
        // Unroutable port keeps the pump from ever seeing a ConnAck
        config.broker_url = "mqtt://127.0.0.1:1".to_string();
        let (transport, _channels) = MqttTransport::new("test-node", &config).unwrap();

        let result = transport.wait_connected(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TransportError::ConnectTimeout(_))));
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_clean() {
        let (mut transport, _channels) =
            MqttTransport::new("test-node", &test_mqtt_section()).unwrap();
        assert!(transport.disconnect().await.is_ok());
    }
}
