//! Actuator state machine
//!
//! Owns the on/off/blinking state of the controlled output and the periodic
//! blink task. Mode and task handle live behind one mutex so dispatcher
//! transitions and the blink task can never race; the output level itself is
//! an atomic, which lets the blink task toggle it without taking the lock.
//!
//! Invariant: a periodic task is armed if and only if the mode is Blinking,
//! and at most one task is ever armed. Every transition that arms a new task
//! aborts the previous one first.

pub mod dispatcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Binary output driven by the actuator (LED stand-in for any binary output)
pub trait OutputPin: Send + Sync + 'static {
    fn set_high(&self);
    fn set_low(&self);
    fn toggle(&self);
    fn is_high(&self) -> bool;
}

/// In-memory pin backed by an atomic level, used where no GPIO is wired up
#[derive(Debug, Default)]
pub struct MemoryPin {
    level: AtomicBool,
}

impl MemoryPin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputPin for MemoryPin {
    fn set_high(&self) {
        self.level.store(true, Ordering::SeqCst);
    }

    fn set_low(&self) {
        self.level.store(false, Ordering::SeqCst);
    }

    fn toggle(&self) {
        self.level.fetch_xor(true, Ordering::SeqCst);
    }

    fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

/// Actuator operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorMode {
    Off,
    On,
    Blinking { frequency_hz: u32 },
}

struct Inner {
    mode: ActuatorMode,
    blink_task: Option<JoinHandle<()>>,
}

/// Owned actuator state shared between the dispatcher and the blink task
pub struct Actuator {
    pin: Arc<dyn OutputPin>,
    inner: Mutex<Inner>,
}

impl Actuator {
    pub fn new(pin: Arc<dyn OutputPin>) -> Self {
        Self {
            pin,
            inner: Mutex::new(Inner {
                mode: ActuatorMode::Off,
                blink_task: None,
            }),
        }
    }

    pub fn mode(&self) -> ActuatorMode {
        self.lock().mode
    }

    /// Whether a periodic blink task is currently armed
    pub fn is_armed(&self) -> bool {
        self.lock().blink_task.is_some()
    }

    pub fn output_high(&self) -> bool {
        self.pin.is_high()
    }

    /// Drive the output high and enter On, disarming any blink task.
    pub fn turn_on(&self) {
        let mut inner = self.lock();
        Self::disarm_locked(&mut inner);
        self.pin.set_high();
        inner.mode = ActuatorMode::On;
        debug!("actuator on");
    }

    /// Drive the output low and enter Off, disarming any blink task.
    pub fn turn_off(&self) {
        let mut inner = self.lock();
        Self::disarm_locked(&mut inner);
        self.pin.set_low();
        inner.mode = ActuatorMode::Off;
        debug!("actuator off");
    }

    /// Invert the output level in place. The mode is untouched: toggling
    /// while Blinking leaves the periodic task armed.
    pub fn toggle(&self) {
        self.pin.toggle();
        debug!(high = self.pin.is_high(), "actuator toggled");
    }

    /// Enter Blinking at the given frequency, arming exactly one periodic
    /// toggle task. Re-entering Blinking replaces the task, never doubles it.
    pub fn blink_on(&self, frequency_hz: u32) {
        let period = Duration::from_millis((1000 / u64::from(frequency_hz.max(1))).max(1));
        let mut inner = self.lock();
        Self::disarm_locked(&mut inner);

        let pin = self.pin.clone();
        inner.blink_task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                pin.toggle();
            }
        }));
        inner.mode = ActuatorMode::Blinking { frequency_hz };
        debug!(frequency_hz, "blink armed");
    }

    /// Disarm the blink task and enter Off. The output keeps whatever level
    /// the last toggle left it at.
    pub fn blink_off(&self) {
        let mut inner = self.lock();
        Self::disarm_locked(&mut inner);
        inner.mode = ActuatorMode::Off;
        debug!("blink disarmed");
    }

    fn disarm_locked(inner: &mut Inner) {
        if let Some(task) = inner.blink_task.take() {
            task.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a holder panicked; the state itself is
        // still consistent because every transition completes under the lock.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            Self::disarm_locked(&mut inner);
        }
    }
}
