//! sensornode - network-attached sensing/actuation node
//!
//! Firmware-style daemon that publishes environment telemetry over MQTT,
//! accepts remote commands driving a binary actuator, transfers bulk binary
//! payloads in bounded-size chunks, and measures broker round-trip latency.
//!
//! # Overview
//!
//! - Chunked bulk-transfer protocol with an `"end"` sentinel and progress
//!   reporting, under a single-attempt failure policy
//! - Command dispatch state machine driving an LED-class output, including a
//!   periodic blink timer
//! - Delivery-latency probe over QoS 1 acknowledgments
//! - Fixed-delay reconnection supervisor for session establishment
//!
//! # Quick Start
//!
//! ```rust
//! use sensornode::actuator::dispatcher::Command;
//! use sensornode::transfer::{block_range, num_blocks};
//!
//! // A 2500-byte frame at the default block size takes three blocks
//! assert_eq!(num_blocks(2500, 1024), 3);
//! assert_eq!(block_range(2, 1024, 2500), (2048, 2500));
//!
//! // Command payloads are literal tokens
//! assert_eq!(Command::parse(b"blinkon"), Some(Command::BlinkOn));
//! assert_eq!(Command::parse(b"reboot"), None);
//! ```

pub mod actuator;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod probe;
pub mod sensor;
pub mod transfer;
pub mod transport;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use node::Node;
pub use probe::{publish_tracked, ProbeReport};
pub use transfer::{TransferJob, TransferOptions, TransferState};
pub use transport::mqtt::MqttTransport;
pub use transport::{DeliveryStatus, QosLevel, Transport};
