//! Long-connection alerts.
//!
//! Timers raise an alert when a device stays connected past the
//! threshold; the tracker clears it again when such a device is removed.

use std::sync::Arc;

use crate::timer::AlertCallback;

/// Receives long-connection alerts.
pub trait AlertSink: Send + Sync {
    /// `device_name` has been connected for longer than the threshold.
    fn raise(&self, device_name: &str);

    /// A device that exceeded the threshold was disconnected.
    fn clear(&self, device_name: &str);
}

/// Sink that discards every alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlerts;

impl AlertSink for NoAlerts {
    fn raise(&self, _device_name: &str) {}

    fn clear(&self, _device_name: &str) {}
}

/// Adapt a sink into the callback timers invoke when they fire.
pub fn raise_callback(sink: Arc<dyn AlertSink>) -> AlertCallback {
    Arc::new(move |device_name: &str| sink.raise(device_name))
}
