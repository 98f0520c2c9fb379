//! Command dispatcher for the subscribed command topic
//!
//! Consumes [`ControlMessage`]s from the transport's inbound channel and
//! drives the actuator. Payloads are the literal tokens
//! `on | off | toggle | blinkon | blinkoff`; anything else is logged and
//! ignored without touching the state machine.

use super::Actuator;
use crate::transport::ControlMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Parsed command token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
    Toggle,
    BlinkOn,
    BlinkOff,
}

impl Command {
    /// Decode a payload as a command token. Tokens are exact byte matches;
    /// no trimming, no case folding.
    pub fn parse(payload: &[u8]) -> Option<Command> {
        match payload {
            b"on" => Some(Command::On),
            b"off" => Some(Command::Off),
            b"toggle" => Some(Command::Toggle),
            b"blinkon" => Some(Command::BlinkOn),
            b"blinkoff" => Some(Command::BlinkOff),
            _ => None,
        }
    }
}

/// Interprets inbound control messages and drives the actuator
pub struct CommandDispatcher {
    actuator: Arc<Actuator>,
    blink_hz: u32,
}

impl CommandDispatcher {
    pub fn new(actuator: Arc<Actuator>, blink_hz: u32) -> Self {
        Self { actuator, blink_hz }
    }

    /// Handle one control message synchronously.
    pub fn handle(&self, msg: &ControlMessage) {
        match Command::parse(&msg.payload) {
            Some(command) => {
                info!(topic = %msg.topic, ?command, "command received");
                self.apply(command);
            }
            None => {
                warn!(
                    topic = %msg.topic,
                    payload = %String::from_utf8_lossy(&msg.payload),
                    "unrecognized command token, ignoring"
                );
            }
        }
    }

    fn apply(&self, command: Command) {
        match command {
            Command::On => self.actuator.turn_on(),
            Command::Off => self.actuator.turn_off(),
            Command::Toggle => self.actuator.toggle(),
            Command::BlinkOn => self.actuator.blink_on(self.blink_hz),
            Command::BlinkOff => self.actuator.blink_off(),
        }
    }

    /// Drain the inbound channel until the transport closes it.
    pub async fn run(self, mut control_rx: mpsc::Receiver<ControlMessage>) {
        while let Some(msg) = control_rx.recv().await {
            self.handle(&msg);
        }
        info!("control channel closed, dispatcher stopping");
    }
}
