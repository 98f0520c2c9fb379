//! MQTT implementation of the transport capability surface

pub mod client;
pub mod connection;

pub use client::{InboundChannels, MqttTransport};
pub use connection::configure_mqtt_options;
