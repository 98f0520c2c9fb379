//! Transport capability surface for the node
//!
//! The node talks to the broker exclusively through the [`Transport`] trait
//! plus two inbound channels: one for control messages on subscribed topics
//! and one for delivery receipts of acknowledged publishes. No retry logic
//! lives here; reconnection policy is in [`supervisor`].

pub mod mqtt;
pub mod supervisor;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Connection state of a broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delivery guarantee for a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    /// Fire-and-forget (telemetry, bulk data blocks)
    AtMostOnce,
    /// Acknowledged at-least-once (latency probe)
    AtLeastOnce,
}

/// Inbound message on a subscribed topic
#[derive(Debug, Clone)]
pub struct ControlMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
    pub dup: bool,
}

/// Broker's verdict on an acknowledged publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// No acknowledgment arrived in time
    Timeout,
    /// Broker acknowledged the publish
    Delivered,
    /// Acknowledgment carried an error reason for the packet identifier
    UnknownPid,
}

/// Acknowledgment for a QoS 1 publish, correlated by packet identifier
#[derive(Debug, Clone, Copy)]
pub struct DeliveryReceipt {
    pub pid: u16,
    pub status: DeliveryStatus,
}

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("publish failed")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("subscribe failed")]
    Subscribe(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("connection confirmation not received within {0:?}")]
    ConnectTimeout(Duration),
    #[error("not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Publish/subscribe capability surface over a connected broker session
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
}

/// Consumer side of the delivery-receipt channel.
///
/// [`DeliveryReceipts::wait_for_receipt`] is the blocking wait-for-one-event
/// primitive: it resolves as soon as exactly one receipt arrives, or yields a
/// synthetic [`DeliveryStatus::Timeout`] receipt when the deadline elapses.
pub struct DeliveryReceipts {
    rx: mpsc::Receiver<DeliveryReceipt>,
}

impl DeliveryReceipts {
    pub fn new(rx: mpsc::Receiver<DeliveryReceipt>) -> Self {
        Self { rx }
    }

    /// Discard receipts already queued in the channel.
    ///
    /// A publish whose wait timed out can still get its acknowledgment later;
    /// that receipt must not be credited to the next tracked publish. Callers
    /// drain before publishing so the receipt they wait on is their own.
    pub fn drain_stale(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(receipt) = self.rx.try_recv() {
            warn!(pid = receipt.pid, "discarding stale delivery receipt");
            drained += 1;
        }
        drained
    }

    pub async fn wait_for_receipt(&mut self, timeout: Duration) -> DeliveryReceipt {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                warn!("delivery receipt channel closed by transport");
                DeliveryReceipt {
                    pid: 0,
                    status: DeliveryStatus::Timeout,
                }
            }
            Err(_) => DeliveryReceipt {
                pid: 0,
                status: DeliveryStatus::Timeout,
            },
        }
    }
}
