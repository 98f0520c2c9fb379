//! Pure connection setup and event routing for the MQTT transport
//!
//! Everything here is free of I/O: options construction from config and the
//! mapping from raw rumqttc events to routing decisions.

use crate::config::MqttSection;
use crate::transport::{ControlMessage, DeliveryReceipt, DeliveryStatus, TransportError};
use rumqttc::v5::mqttbytes::v5::{Packet, PubAckReason};
use rumqttc::v5::{Event, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Build rumqttc options from the node's MQTT configuration.
///
/// Credentials are resolved from the environment variables named in the
/// config, never stored in the config file itself.
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    Ok(mqtt_options)
}

/// Routing decision for one event off the broker session
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// ConnAck received - session usable, re-subscribe tracked topics
    ConnectionAcknowledged,
    /// Message arrived on a subscribed topic
    Inbound(ControlMessage),
    /// Acknowledgment for a QoS 1 publish
    Receipt(DeliveryReceipt),
    /// Broker closed the session
    Disconnected,
    /// Keep-alive traffic and other infrastructure packets
    Infrastructure,
    /// Outgoing packet handled by rumqttc
    Outgoing,
}

/// Map a rumqttc event to a routing decision.
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::Inbound(ControlMessage {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.clone(),
                retain: publish.retain,
                dup: publish.dup,
            }),
            Packet::PubAck(puback) => {
                EventRoute::Receipt(map_puback(puback.pkid, &puback.reason))
            }
            Packet::Disconnect(_) => EventRoute::Disconnected,
            _ => EventRoute::Infrastructure,
        },
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

/// Translate a PubAck into a delivery receipt.
///
/// Success reasons (including "no matching subscribers") count as delivered;
/// any error reason means the broker could not account for the packet id.
pub fn map_puback(pkid: u16, reason: &PubAckReason) -> DeliveryReceipt {
    let status = match reason {
        PubAckReason::Success | PubAckReason::NoMatchingSubscribers => DeliveryStatus::Delivered,
        _ => DeliveryStatus::UnknownPid,
    };
    DeliveryReceipt { pid: pkid, status }
}
