//! Round-trip delivery-latency probe
//!
//! Publishes a message at QoS 1, blocks until the broker's delivery receipt
//! arrives (or the wait times out) and reports the elapsed time. No receipt
//! outcome is fatal: the caller always gets a latency measurement.

use crate::transport::{DeliveryReceipts, DeliveryStatus, QosLevel, Transport, TransportError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one tracked publish
#[derive(Debug, Clone, Copy)]
pub struct ProbeReport {
    pub elapsed: Duration,
    pub status: DeliveryStatus,
}

/// Publish `payload` with acknowledgment tracking and measure the round trip.
///
/// The elapsed time is measured on a monotonic clock from just before the
/// publish until the receipt resolves, and is returned for every status.
pub async fn publish_tracked<T: Transport + ?Sized>(
    transport: &T,
    receipts: &mut DeliveryReceipts,
    topic: &str,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<ProbeReport, TransportError> {
    // A late acknowledgment for an earlier timed-out publish may still be
    // queued; it belongs to that publish, not this one.
    let stale = receipts.drain_stale();
    if stale > 0 {
        warn!(stale, "dropped receipts from earlier tracked publishes");
    }

    let start = Instant::now();
    transport
        .publish(topic, payload, QosLevel::AtLeastOnce, false)
        .await?;

    let receipt = receipts.wait_for_receipt(timeout).await;
    let elapsed = start.elapsed();

    match receipt.status {
        DeliveryStatus::Delivered => {
            info!(pid = receipt.pid, "status: successfully delivered");
        }
        DeliveryStatus::Timeout => {
            warn!("status: timeout");
        }
        DeliveryStatus::UnknownPid => {
            warn!(pid = receipt.pid, "status: unknown PID");
        }
    }
    info!("respond time broker: {} ms", elapsed.as_millis());

    Ok(ProbeReport {
        elapsed,
        status: receipt.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DeliveryReceipt;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn publish(
            &self,
            _topic: &str,
            _payload: Vec<u8>,
            _qos: QosLevel,
            _retain: bool,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn subscribe(&self, _topic: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Send a receipt once the probe is already waiting; receipts queued
    /// before the publish count as stale and are drained.
    fn send_during_wait(tx: mpsc::Sender<DeliveryReceipt>, receipt: DeliveryReceipt) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(receipt).await;
        });
    }

    #[tokio::test]
    async fn delivered_receipt_is_reported_with_elapsed_time() {
        let (tx, rx) = mpsc::channel(8);
        let mut receipts = DeliveryReceipts::new(rx);
        send_during_wait(
            tx,
            DeliveryReceipt {
                pid: 1,
                status: DeliveryStatus::Delivered,
            },
        );

        let report = publish_tracked(
            &NullTransport,
            &mut receipts,
            "node/env",
            b"ping".to_vec(),
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        assert_eq!(report.status, DeliveryStatus::Delivered);
        assert!(report.elapsed >= Duration::ZERO);
    }

    #[tokio::test]
    async fn missing_receipt_reports_timeout_not_error() {
        let (_tx, rx) = mpsc::channel::<DeliveryReceipt>(8);
        let mut receipts = DeliveryReceipts::new(rx);

        let report = publish_tracked(
            &NullTransport,
            &mut receipts,
            "node/env",
            b"ping".to_vec(),
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert_eq!(report.status, DeliveryStatus::Timeout);
        assert!(report.elapsed >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn unknown_pid_receipt_is_not_fatal() {
        let (tx, rx) = mpsc::channel(8);
        let mut receipts = DeliveryReceipts::new(rx);
        send_during_wait(
            tx,
            DeliveryReceipt {
                pid: 99,
                status: DeliveryStatus::UnknownPid,
            },
        );

        let report = publish_tracked(
            &NullTransport,
            &mut receipts,
            "node/env",
            b"ping".to_vec(),
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        assert_eq!(report.status, DeliveryStatus::UnknownPid);
    }
}
