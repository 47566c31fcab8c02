//! Boundary filtering of reported devices.
//!
//! The host reports its own audio routes (earpiece, speakers, microphones,
//! telephony and so on) through the same notifications as real
//! peripherals. Those never become connections. Neither does a device that
//! carries the host's own model name, which some hosts report for their
//! internal codec.

use headwatch_types::{DeviceCategory, DeviceDescriptor};

/// Outcome of classifying a reported device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    /// Track the device under this (trimmed) name.
    Track(&'a str),
    /// Builtin category; ignored.
    Builtin(DeviceCategory),
    /// Name equals the host model name; ignored.
    HostModel,
    /// Name is empty after trimming; ignored.
    Unnamed,
}

impl Verdict<'_> {
    /// Whether the device should be tracked.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Verdict::Track(_))
    }
}

/// Decides which reported devices the tracker admits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    host_model_name: Option<String>,
}

impl DeviceFilter {
    /// Create a filter. `host_model_name` is compared after trimming.
    pub fn new(host_model_name: Option<&str>) -> Self {
        Self {
            host_model_name: host_model_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }

    /// The host model name in effect, if any.
    pub fn host_model_name(&self) -> Option<&str> {
        self.host_model_name.as_deref()
    }

    /// Classify a reported device.
    ///
    /// # Example
    ///
    /// ```
    /// use headwatch_core::filter::{DeviceFilter, Verdict};
    /// use headwatch_types::DeviceDescriptor;
    ///
    /// let filter = DeviceFilter::new(Some("Pixel 8"));
    /// let buds = DeviceDescriptor::new(" Buds ", 8);
    /// assert_eq!(filter.classify(&buds), Verdict::Track("Buds"));
    /// assert_eq!(filter.classify(&DeviceDescriptor::new("Pixel 8", 8)), Verdict::HostModel);
    /// ```
    pub fn classify<'a>(&self, device: &'a DeviceDescriptor) -> Verdict<'a> {
        let category = device.category();
        if category.is_builtin() {
            return Verdict::Builtin(category);
        }

        let name = device.identity();
        if name.is_empty() {
            return Verdict::Unnamed;
        }
        if self.host_model_name.as_deref() == Some(name) {
            return Verdict::HostModel;
        }

        Verdict::Track(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_devices_rejected() {
        let filter = DeviceFilter::new(None);
        for code in [1, 2, 15, 16, 18, 24, 25, 28] {
            let device = DeviceDescriptor::new("Internal", code);
            assert!(
                matches!(filter.classify(&device), Verdict::Builtin(_)),
                "code {} should be filtered",
                code
            );
        }
    }

    #[test]
    fn test_external_devices_tracked_with_trimmed_name() {
        let filter = DeviceFilter::new(None);
        let device = DeviceDescriptor::new("\tBuds Pro  ", 8);
        assert_eq!(filter.classify(&device), Verdict::Track("Buds Pro"));
        assert!(filter.classify(&device).is_tracked());
    }

    #[test]
    fn test_host_model_rejected() {
        let filter = DeviceFilter::new(Some("  ThinkPad X1 "));
        assert_eq!(filter.host_model_name(), Some("ThinkPad X1"));

        let device = DeviceDescriptor::new("ThinkPad X1 ", 11);
        assert_eq!(filter.classify(&device), Verdict::HostModel);

        let other = DeviceDescriptor::new("ThinkPad Dock", 11);
        assert!(filter.classify(&other).is_tracked());
    }

    #[test]
    fn test_blank_names_rejected() {
        let filter = DeviceFilter::new(Some("   "));
        assert_eq!(filter.host_model_name(), None);
        assert_eq!(filter.classify(&DeviceDescriptor::new("  ", 8)), Verdict::Unnamed);
    }
}
