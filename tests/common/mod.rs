//! Shared test helpers: an in-memory transport fake
//!
//! Records every publish so tests can assert on message sequences without a
//! live broker, and can be armed to fail a specific publish call to exercise
//! abort paths.

use async_trait::async_trait;
use sensornode::transport::{QosLevel, Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<PublishedMessage>>,
    subscribed: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the publish with the given zero-based call index.
    pub fn failing_on_call(index: usize) -> Self {
        Self {
            fail_on_call: Some(index),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Payloads published on one topic, in publish order.
    pub fn payloads_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), TransportError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(TransportError::Publish("injected publish failure".into()));
        }

        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}
