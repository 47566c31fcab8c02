//! Per-device duration timers.
//!
//! A [`DeviceTimer`] is a single-shot alarm tied to one device name. The
//! tracker arms one for every active connection while duration-watching is
//! enabled; if the device is still connected when the delay elapses, the
//! timer invokes its alert callback with the device name.
//!
//! [`ScheduledTimer`] is the tokio implementation. Each `start()` creates a
//! new arm cycle whose state moves through
//!
//! ```text
//! Armed --deadline--> Firing --> Fired
//!   |                   |
//!   +--stop()--> Stopped <--stop()
//! ```
//!
//! The `Armed` exit is a single compare-and-swap, so a `stop()` that wins
//! it guarantees the callback never runs, and a `stop()` that loses it
//! (firing already began) leaves the callback alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Callback invoked with the device name when a timer fires.
pub type AlertCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A cancellable single-shot alarm for one device.
pub trait DeviceTimer: Send {
    /// The device this timer belongs to.
    fn device_name(&self) -> &str;

    /// Arm the timer.
    ///
    /// Returns [`Error::TimerAlreadyArmed`] if the timer is armed; callers
    /// must `stop()` first.
    fn start(&mut self) -> Result<()>;

    /// Disarm the timer. Does nothing if it is not armed.
    fn stop(&mut self);

    /// Whether the timer is armed or currently firing.
    fn is_armed(&self) -> bool;
}

/// Creates timers for the tracker.
pub trait TimerFactory: Send + Sync {
    /// Create an unarmed timer for `device_name` that fires after `delay`.
    fn create(&self, device_name: &str, delay: Duration) -> Box<dyn DeviceTimer>;
}

const ARMED: u8 = 1;
const FIRING: u8 = 2;
const FIRED: u8 = 3;
const STOPPED: u8 = 4;

struct ArmCycle {
    state: AtomicU8,
    cancel: CancellationToken,
}

impl ArmCycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ARMED),
            cancel: CancellationToken::new(),
        }
    }

    fn load(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }
}

/// Tokio-backed [`DeviceTimer`].
pub struct ScheduledTimer {
    device_name: String,
    delay: Duration,
    on_fire: AlertCallback,
    runtime: Handle,
    cycle: Option<Arc<ArmCycle>>,
    task: Option<JoinHandle<()>>,
}

impl ScheduledTimer {
    /// Create an unarmed timer that schedules on `runtime`.
    pub fn new(
        device_name: impl Into<String>,
        delay: Duration,
        on_fire: AlertCallback,
        runtime: Handle,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            delay,
            on_fire,
            runtime,
            cycle: None,
            task: None,
        }
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether the current arm cycle delivered its alert.
    pub fn has_fired(&self) -> bool {
        self.cycle
            .as_ref()
            .is_some_and(|cycle| cycle.load() == FIRED)
    }
}

impl DeviceTimer for ScheduledTimer {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn start(&mut self) -> Result<()> {
        if self.is_armed() {
            return Err(Error::timer_already_armed(&self.device_name));
        }

        let cycle = Arc::new(ArmCycle::new());
        let deadline = Instant::now() + self.delay;
        let task_cycle = Arc::clone(&cycle);
        let on_fire = Arc::clone(&self.on_fire);
        let name = self.device_name.clone();

        let task = self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = task_cycle.cancel.cancelled() => {
                    debug!(device = %name, "Timer cancelled before deadline");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if task_cycle
                        .state
                        .compare_exchange(ARMED, FIRING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        info!(device = %name, "Connection duration limit reached");
                        on_fire(&name);
                        // Fails if stop() ran while firing; Stopped is kept.
                        let _ = task_cycle.state.compare_exchange(
                            FIRING,
                            FIRED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                    }
                }
            }
        });

        debug!(device = %self.device_name, delay = ?self.delay, "Timer armed");
        self.cycle = Some(cycle);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(cycle) = &self.cycle else {
            return;
        };

        match cycle
            .state
            .compare_exchange(ARMED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                cycle.cancel.cancel();
                debug!(device = %self.device_name, "Timer stopped");
            }
            Err(FIRING) => {
                // The alert is already being delivered; only block any rearm.
                cycle.state.store(STOPPED, Ordering::Release);
                debug!(device = %self.device_name, "Timer stopped while firing");
            }
            Err(_) => {}
        }
        self.task = None;
    }

    fn is_armed(&self) -> bool {
        self.cycle
            .as_ref()
            .is_some_and(|cycle| matches!(cycle.load(), ARMED | FIRING))
    }
}

impl Drop for ScheduledTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`TimerFactory`] producing [`ScheduledTimer`]s on one runtime.
#[derive(Clone)]
pub struct ScheduledTimerFactory {
    runtime: Handle,
    on_fire: AlertCallback,
}

impl ScheduledTimerFactory {
    /// Create a factory scheduling on `runtime`.
    pub fn new(runtime: Handle, on_fire: AlertCallback) -> Self {
        Self { runtime, on_fire }
    }

    /// Create a factory on the runtime of the calling context.
    pub fn current(on_fire: AlertCallback) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Ok(Self::new(runtime, on_fire))
    }
}

impl TimerFactory for ScheduledTimerFactory {
    fn create(&self, device_name: &str, delay: Duration) -> Box<dyn DeviceTimer> {
        Box::new(ScheduledTimer::new(
            device_name,
            delay,
            Arc::clone(&self.on_fire),
            self.runtime.clone(),
        ))
    }
}
