//! Test doubles for the tracker's collaborators.
//!
//! These are used by the crate's own tests and by downstream crates that
//! want to exercise a [`DeviceStateTracker`](crate::DeviceStateTracker)
//! without a tokio runtime or a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use headwatch_types::ConnectionRecord;

use crate::alerts::AlertSink;
use crate::bus::{ActiveSnapshot, ChangeListener, ListenerResult};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::persist::RecordSink;
use crate::timer::{AlertCallback, DeviceTimer, TimerFactory};
use crate::tracker::RefreshHook;

/// A call observed by a [`MockTimerFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCall {
    /// A timer was created.
    Created(String, Duration),
    /// A timer was armed.
    Started(String),
    /// An armed timer was disarmed.
    Stopped(String),
    /// A timer was fired by the test.
    Fired(String),
}

#[derive(Default)]
struct MockShared {
    calls: Mutex<Vec<TimerCall>>,
    armed: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
    on_fire: Option<AlertCallback>,
}

impl MockShared {
    fn record(&self, call: TimerCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn armed(&self) -> std::sync::MutexGuard<'_, HashMap<u64, String>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`TimerFactory`] whose timers only fire when told to.
#[derive(Clone, Default)]
pub struct MockTimerFactory {
    shared: Arc<MockShared>,
}

impl MockTimerFactory {
    /// Create a factory whose timers have no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory whose timers invoke `on_fire` when fired.
    pub fn with_callback(on_fire: AlertCallback) -> Self {
        Self {
            shared: Arc::new(MockShared {
                on_fire: Some(on_fire),
                ..Default::default()
            }),
        }
    }

    /// Every call observed so far.
    pub fn calls(&self) -> Vec<TimerCall> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of timers created.
    pub fn created_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TimerCall::Created(..)))
            .count()
    }

    /// Number of times an armed timer was stopped.
    pub fn stop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TimerCall::Stopped(_)))
            .count()
    }

    /// Delays of created timers, in creation order.
    pub fn delays(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TimerCall::Created(_, delay) => Some(delay),
                _ => None,
            })
            .collect()
    }

    /// Number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.shared.armed().len()
    }

    /// Names of armed timers, sorted.
    pub fn armed_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.armed().values().cloned().collect();
        names.sort();
        names
    }

    /// Whether a timer for `device_name` is armed.
    pub fn is_armed(&self, device_name: &str) -> bool {
        self.shared.armed().values().any(|name| name == device_name)
    }

    /// Fire the armed timer for `device_name`.
    ///
    /// Returns `false` if no such timer is armed.
    pub fn fire(&self, device_name: &str) -> bool {
        let fired = {
            let mut armed = self.shared.armed();
            let id = armed
                .iter()
                .find(|(_, name)| name.as_str() == device_name)
                .map(|(id, _)| *id);
            id.and_then(|id| armed.remove(&id))
        };

        let Some(name) = fired else {
            return false;
        };
        self.shared.record(TimerCall::Fired(name.clone()));
        if let Some(on_fire) = &self.shared.on_fire {
            on_fire(&name);
        }
        true
    }
}

impl TimerFactory for MockTimerFactory {
    fn create(&self, device_name: &str, delay: Duration) -> Box<dyn DeviceTimer> {
        self.shared
            .record(TimerCall::Created(device_name.to_string(), delay));
        Box::new(MockTimer {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            device_name: device_name.to_string(),
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MockTimer {
    id: u64,
    device_name: String,
    shared: Arc<MockShared>,
}

impl DeviceTimer for MockTimer {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn start(&mut self) -> Result<()> {
        let mut armed = self.shared.armed();
        if armed.contains_key(&self.id) {
            return Err(Error::timer_already_armed(&self.device_name));
        }
        armed.insert(self.id, self.device_name.clone());
        drop(armed);
        self.shared
            .record(TimerCall::Started(self.device_name.clone()));
        Ok(())
    }

    fn stop(&mut self) {
        let removed = self.shared.armed().remove(&self.id);
        if removed.is_some() {
            self.shared
                .record(TimerCall::Stopped(self.device_name.clone()));
        }
    }

    fn is_armed(&self) -> bool {
        self.shared.armed().contains_key(&self.id)
    }
}

impl Drop for MockTimer {
    fn drop(&mut self) {
        self.shared.armed().remove(&self.id);
    }
}

/// [`RecordSink`] that keeps submitted records in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<ConnectionRecord>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Create an open sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records submitted so far.
    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reject every later submission with [`Error::Shutdown`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl RecordSink for RecordingSink {
    fn submit(&self, record: ConnectionRecord) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

/// [`AlertSink`] that records raised and cleared alerts.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    raised: Mutex<Vec<String>>,
    cleared: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices alerts were raised for.
    pub fn raised(&self) -> Vec<String> {
        self.raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Devices alerts were cleared for.
    pub fn cleared(&self) -> Vec<String> {
        self.cleared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn raise(&self, device_name: &str) {
        self.raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device_name.to_string());
    }

    fn clear(&self, device_name: &str) {
        self.cleared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device_name.to_string());
    }
}

/// [`ChangeListener`] that keeps every snapshot it receives.
#[derive(Debug, Default)]
pub struct CollectingListener {
    snapshots: Mutex<Vec<ActiveSnapshot>>,
}

impl CollectingListener {
    /// Create an empty listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots received so far.
    pub fn snapshots(&self) -> Vec<ActiveSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest snapshot.
    pub fn last(&self) -> Option<ActiveSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of snapshots received.
    pub fn count(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ChangeListener for CollectingListener {
    fn on_active_devices_changed(&self, snapshot: &ActiveSnapshot) -> ListenerResult {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "collector"
    }
}

/// Counts refresh requests.
#[derive(Debug, Clone, Default)]
pub struct RefreshCounter {
    count: Arc<AtomicUsize>,
}

impl RefreshCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook that increments this counter.
    pub fn hook(&self) -> RefreshHook {
        let count = Arc::clone(&self.count);
        Arc::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Refreshes requested so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// [`Clock`] moved by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start` ms.
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
