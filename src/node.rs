//! Node runtime: wires transport, dispatcher, sensor and transfer engine
//!
//! The main loop alternates between periodic telemetry publication
//! (non-blocking, QoS 0) and bulk-transfer publication (blocking,
//! multi-step). Inbound commands and delivery receipts arrive through the
//! transport's channels; commands are drained by the dispatcher task,
//! receipts by the latency probe. Every `probe.interval_secs` the telemetry
//! publish is upgraded to a tracked QoS 1 publish to measure broker
//! responsiveness.

use crate::actuator::dispatcher::CommandDispatcher;
use crate::actuator::{Actuator, MemoryPin, OutputPin};
use crate::config::NodeConfig;
use crate::error::NodeResult;
use crate::probe::publish_tracked;
use crate::sensor::{FrameSource, Sensor, SimulatedSensor, SyntheticFrameSource};
use crate::transfer::{TransferJob, TransferOptions};
use crate::transport::mqtt::MqttTransport;
use crate::transport::supervisor::{connect_with_retry, RetryPolicy};
use crate::transport::{DeliveryReceipts, QosLevel, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Running node: owns the broker session and all periodic work
pub struct Node {
    config: NodeConfig,
    transport: MqttTransport,
    receipts: DeliveryReceipts,
    sensor: Box<dyn Sensor>,
    frames: Box<dyn FrameSource>,
    dispatcher_task: JoinHandle<()>,
}

impl Node {
    /// Connect (with the configured retry policy), subscribe the command
    /// topic and start the dispatcher. Uses the simulated sensor, synthetic
    /// frame source and an in-memory output pin as collaborators.
    pub async fn start(config: NodeConfig) -> NodeResult<Self> {
        let pin: Arc<dyn OutputPin> = Arc::new(MemoryPin::new());
        let sensor = Box::new(SimulatedSensor::new());
        let frames = Box::new(SyntheticFrameSource::new(config.transfer.frame_len));
        Self::start_with(config, pin, sensor, frames).await
    }

    /// Same as [`Node::start`] with explicit collaborators (real GPIO, real
    /// sensor, real frame storage).
    pub async fn start_with(
        config: NodeConfig,
        pin: Arc<dyn OutputPin>,
        sensor: Box<dyn Sensor>,
        frames: Box<dyn FrameSource>,
    ) -> NodeResult<Self> {
        let policy = RetryPolicy {
            retry_delay: Duration::from_secs(config.reconnect.delay_secs),
            max_retries: config.reconnect.max_retries,
        };

        let (transport, channels) = connect_with_retry(&policy, |_attempt| {
            MqttTransport::connect(&config.node.id, &config.mqtt)
        })
        .await?;
        info!(broker = %config.mqtt.broker_url, "connected to broker");

        transport.subscribe(&config.topics.command).await?;
        info!(topic = %config.topics.command, "subscribed to command topic");

        let actuator = Arc::new(Actuator::new(pin));
        let dispatcher = CommandDispatcher::new(actuator, config.actuator.blink_hz);
        let dispatcher_task = tokio::spawn(dispatcher.run(channels.control));

        Ok(Node {
            config,
            transport,
            receipts: channels.receipts,
            sensor,
            frames,
            dispatcher_task,
        })
    }

    /// Run until ctrl-c.
    pub async fn run(mut self) -> NodeResult<()> {
        let telemetry_period = self.config.telemetry_interval();
        let transfer_period = Duration::from_secs(self.config.transfer.interval_secs);
        let probe_period = Duration::from_secs(self.config.probe.interval_secs);

        let mut telemetry_ticks = interval_at(Instant::now(), telemetry_period);
        let mut transfer_ticks = interval_at(Instant::now() + transfer_period, transfer_period);
        telemetry_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        transfer_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_probe = Instant::now();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = telemetry_ticks.tick() => {
                    let probe_due = last_probe.elapsed() >= probe_period;
                    self.publish_telemetry(probe_due).await;
                    if probe_due {
                        last_probe = Instant::now();
                    }
                }
                _ = transfer_ticks.tick() => {
                    self.run_transfer().await;
                }
            }
        }

        self.dispatcher_task.abort();
        self.transport.disconnect().await?;
        Ok(())
    }

    /// One telemetry cycle: read the sensor, serialize, publish. A failed
    /// publish is logged and the loop continues; the session pump is already
    /// working on getting the connection back.
    async fn publish_telemetry(&mut self, tracked: bool) {
        let reading = self.sensor.read();
        let payload = match serde_json::to_vec(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!("telemetry serialization failed: {e}");
                return;
            }
        };

        if tracked {
            match publish_tracked(
                &self.transport,
                &mut self.receipts,
                &self.config.topics.telemetry,
                payload,
                self.config.probe_timeout(),
            )
            .await
            {
                Ok(report) => {
                    info!(
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        status = ?report.status,
                        "latency probe finished"
                    );
                }
                Err(e) => warn!("tracked telemetry publish failed: {e}"),
            }
        } else if let Err(e) = self
            .transport
            .publish(
                &self.config.topics.telemetry,
                payload,
                QosLevel::AtMostOnce,
                false,
            )
            .await
        {
            warn!("telemetry publish failed: {e}");
        }
    }

    /// One bulk send. An aborted job affects only itself; the next tick
    /// starts a fresh frame.
    async fn run_transfer(&mut self) {
        let frame = self.frames.next_frame();
        let options = TransferOptions {
            block_size: self.config.transfer.block_size,
            inter_block_pause: Duration::from_millis(self.config.transfer.inter_block_pause_ms),
        };
        let mut job = TransferJob::new(self.config.topics.transfer.clone(), frame, options);

        if let Err(e) = job.run(&self.transport).await {
            warn!(job_id = %job.id(), "bulk transfer aborted: {e}");
        }
    }
}
