//! Console presentation: the status line and alert logging.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use headwatch_core::{ActiveSnapshot, AlertSink, ChangeListener, ListenerResult, RefreshHook};

use crate::volume::VolumeLevel;

#[derive(Debug, Default)]
struct IndicatorState {
    revision: u64,
    devices: Vec<String>,
    volume: Option<u8>,
}

/// Prints one status line per refresh.
///
/// Subscribe it to the tracker's bus to keep the device list current and
/// install [`ConsoleIndicator::refresh_hook`] on the tracker so the line is
/// printed after every change.
pub struct ConsoleIndicator {
    writer: Mutex<Box<dyn Write + Send>>,
    state: Mutex<IndicatorState>,
}

impl ConsoleIndicator {
    /// Indicator writing to stdout.
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Indicator writing to `writer`.
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            state: Mutex::new(IndicatorState::default()),
        }
    }

    /// Record the latest volume. `None` hides the volume field.
    pub fn set_volume(&self, percent: Option<u8>) {
        self.lock_state().volume = percent;
    }

    /// The status line as it would be printed.
    pub fn render(&self) -> String {
        let state = self.lock_state();

        let mut line = match state.devices.len() {
            0 => "No audio devices connected".to_string(),
            1 => format!("1 device connected: {}", state.devices[0]),
            n => format!("{} devices connected: {}", n, state.devices.join(", ")),
        };
        if let Some(percent) = state.volume {
            let level = VolumeLevel::from_percent(percent);
            line.push_str(&format!(" | volume {} {} {}%", level.bar(), level, percent));
        }
        line
    }

    /// Write the status line.
    pub fn print(&self) -> std::io::Result<()> {
        let line = self.render();
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()
    }

    /// Refresh hook that prints the status line.
    pub fn refresh_hook(self: &Arc<Self>) -> RefreshHook {
        let indicator = Arc::clone(self);
        Arc::new(move || {
            if let Err(e) = indicator.print() {
                warn!(error = %e, "Failed to print status line");
            }
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, IndicatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeListener for ConsoleIndicator {
    fn on_active_devices_changed(&self, snapshot: &ActiveSnapshot) -> ListenerResult {
        let mut state = self.lock_state();
        if snapshot.revision < state.revision {
            debug!(
                revision = snapshot.revision,
                current = state.revision,
                "Ignoring stale snapshot"
            );
            return Ok(());
        }
        state.revision = snapshot.revision;
        state.devices = snapshot
            .device_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(())
    }

    fn name(&self) -> &str {
        "console-indicator"
    }
}

impl std::fmt::Debug for ConsoleIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleIndicator")
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

/// Alert sink that reports long connections through the log.
#[derive(Debug)]
pub struct LogAlerts {
    threshold: Duration,
    raised: Mutex<BTreeSet<String>>,
}

impl LogAlerts {
    /// Sink for alerts raised after `threshold`.
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            raised: Mutex::new(BTreeSet::new()),
        }
    }

    /// Devices with an alert that has not been cleared yet.
    pub fn outstanding(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlertSink for LogAlerts {
    fn raise(&self, device_name: &str) {
        self.lock().insert(device_name.to_string());
        warn!(
            device = %device_name,
            threshold_secs = self.threshold.as_secs(),
            "Device has been connected longer than the alert threshold"
        );
    }

    fn clear(&self, device_name: &str) {
        if self.lock().remove(device_name) {
            info!(device = %device_name, "Long connection ended");
        } else {
            debug!(device = %device_name, "Long connection ended without an alert");
        }
    }
}
