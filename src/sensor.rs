//! External collaborators: the environment sensor and the bulk frame source
//!
//! Both are opaque seams. The sensor returns a structured reading that the
//! node serializes into the telemetry payload; the frame source hands out
//! byte buffers for the chunked transfer engine. Simulated implementations
//! stand in where no hardware or storage is wired up.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One environment reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "tmp")]
    pub temperature: f32,
    #[serde(rename = "hum")]
    pub humidity: f32,
}

/// Opaque sensor acquisition
pub trait Sensor: Send + Sync {
    fn read(&self) -> SensorReading;
}

/// Deterministic stand-in for a DHT-class temperature/humidity sensor
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    tick: AtomicU64,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sensor for SimulatedSensor {
    fn read(&self) -> SensorReading {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        // Slow sine-like drift around plausible indoor values
        let phase = (tick % 60) as f32 / 60.0;
        SensorReading {
            temperature: 21.5 + 2.0 * (phase * std::f32::consts::TAU).sin(),
            humidity: 48.0 + 5.0 * (phase * std::f32::consts::TAU).cos(),
        }
    }
}

/// Opaque source of bulk payloads (camera frames in the original deployment)
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Bytes;
}

/// Generates patterned frames of a fixed size
#[derive(Debug)]
pub struct SyntheticFrameSource {
    frame_len: usize,
    counter: u64,
}

impl SyntheticFrameSource {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            counter: 0,
        }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Bytes {
        let seed = self.counter;
        self.counter += 1;
        let frame: Vec<u8> = (0..self.frame_len)
            .map(|i| ((i as u64 + seed) % 251) as u8)
            .collect();
        Bytes::from(frame)
    }
}
