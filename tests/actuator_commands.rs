//! End-to-end command dispatch tests
//!
//! Feeds control messages through the dispatcher's channel, the way the
//! transport event pump delivers them, and asserts on the resulting actuator
//! state and timer arming.

use bytes::Bytes;
use sensornode::actuator::dispatcher::CommandDispatcher;
use sensornode::actuator::{Actuator, ActuatorMode, MemoryPin};
use sensornode::transport::ControlMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn command(payload: &'static str) -> ControlMessage {
    ControlMessage {
        topic: "node/led".to_string(),
        payload: Bytes::from_static(payload.as_bytes()),
        retain: false,
        dup: false,
    }
}

async fn drive(commands: &[&'static str]) -> Arc<Actuator> {
    let actuator = Arc::new(Actuator::new(Arc::new(MemoryPin::new())));
    let dispatcher = CommandDispatcher::new(actuator.clone(), 10);
    let (tx, rx) = mpsc::channel(16);

    for payload in commands {
        tx.send(command(payload)).await.unwrap();
    }
    drop(tx);
    dispatcher.run(rx).await;

    actuator
}

#[tokio::test]
async fn on_blinkon_blinkoff_ends_off_with_timer_disarmed() {
    let actuator = drive(&["on", "blinkon", "blinkoff"]).await;

    assert_eq!(actuator.mode(), ActuatorMode::Off);
    assert!(!actuator.is_armed());
}

#[tokio::test(start_paused = true)]
async fn double_blinkon_does_not_double_arm() {
    let actuator = drive(&["blinkon", "blinkon"]).await;
    assert!(actuator.is_armed());

    // A single 10 Hz timer toggles once per 100 ms; a doubled timer would
    // toggle twice in this window and land back on the starting level.
    let level = actuator.output_high();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_ne!(actuator.output_high(), level);
}

#[tokio::test]
async fn toggle_while_blinking_keeps_blinking() {
    let actuator = drive(&["blinkon", "toggle"]).await;

    assert_eq!(actuator.mode(), ActuatorMode::Blinking { frequency_hz: 10 });
    assert!(actuator.is_armed());
}

#[tokio::test]
async fn unknown_tokens_do_not_disturb_state() {
    let actuator = drive(&["on", "ON", "on off", "blink", ""]).await;

    assert_eq!(actuator.mode(), ActuatorMode::On);
    assert!(actuator.output_high());
}

#[tokio::test]
async fn off_after_blink_drives_output_low_and_disarms() {
    let actuator = drive(&["blinkon", "off"]).await;

    assert_eq!(actuator.mode(), ActuatorMode::Off);
    assert!(!actuator.is_armed());
    assert!(!actuator.output_high());
}
