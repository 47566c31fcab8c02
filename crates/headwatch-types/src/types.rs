//! Core types for audio device connection sessions.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Category of an audio device as reported by the host audio subsystem.
///
/// The numeric codes follow the host's device type table. Codes that this
/// crate does not name are kept as [`DeviceCategory::Other`] so they
/// round-trip unchanged into history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum DeviceCategory {
    /// Phone earpiece.
    BuiltinEarpiece,
    /// Built-in loudspeaker.
    BuiltinSpeaker,
    /// Wired headset with microphone.
    WiredHeadset,
    /// Wired headphones without microphone.
    WiredHeadphones,
    /// Bluetooth device using the SCO profile.
    BluetoothSco,
    /// Bluetooth device using the A2DP profile.
    BluetoothA2dp,
    /// HDMI output.
    Hdmi,
    /// USB audio device.
    UsbDevice,
    /// Built-in microphone.
    BuiltinMic,
    /// FM radio tuner.
    FmTuner,
    /// Telephony uplink/downlink.
    Telephony,
    /// USB headset.
    UsbHeadset,
    /// Hearing aid.
    HearingAid,
    /// Built-in speaker with output protection.
    BuiltinSpeakerSafe,
    /// Remote submix (audio capture of the mix).
    RemoteSubmix,
    /// Bluetooth LE audio headset.
    BleHeadset,
    /// Bluetooth LE audio speaker.
    BleSpeaker,
    /// Vendor-specific internal route (code 28).
    VendorInternal,
    /// Any code not listed above.
    Other(i32),
}

impl DeviceCategory {
    /// Map a raw category code to a category.
    ///
    /// # Examples
    ///
    /// ```
    /// use headwatch_types::DeviceCategory;
    ///
    /// assert_eq!(DeviceCategory::from_code(8), DeviceCategory::BluetoothA2dp);
    /// assert_eq!(DeviceCategory::from_code(999), DeviceCategory::Other(999));
    /// ```
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::BuiltinEarpiece,
            2 => Self::BuiltinSpeaker,
            3 => Self::WiredHeadset,
            4 => Self::WiredHeadphones,
            7 => Self::BluetoothSco,
            8 => Self::BluetoothA2dp,
            9 => Self::Hdmi,
            11 => Self::UsbDevice,
            15 => Self::BuiltinMic,
            16 => Self::FmTuner,
            18 => Self::Telephony,
            22 => Self::UsbHeadset,
            23 => Self::HearingAid,
            24 => Self::BuiltinSpeakerSafe,
            25 => Self::RemoteSubmix,
            26 => Self::BleHeadset,
            27 => Self::BleSpeaker,
            28 => Self::VendorInternal,
            other => Self::Other(other),
        }
    }

    /// The raw category code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::BuiltinEarpiece => 1,
            Self::BuiltinSpeaker => 2,
            Self::WiredHeadset => 3,
            Self::WiredHeadphones => 4,
            Self::BluetoothSco => 7,
            Self::BluetoothA2dp => 8,
            Self::Hdmi => 9,
            Self::UsbDevice => 11,
            Self::BuiltinMic => 15,
            Self::FmTuner => 16,
            Self::Telephony => 18,
            Self::UsbHeadset => 22,
            Self::HearingAid => 23,
            Self::BuiltinSpeakerSafe => 24,
            Self::RemoteSubmix => 25,
            Self::BleHeadset => 26,
            Self::BleSpeaker => 27,
            Self::VendorInternal => 28,
            Self::Other(code) => code,
        }
    }

    /// Whether this category is part of the host itself rather than a
    /// peripheral. Builtin devices are never tracked.
    #[must_use]
    pub fn is_builtin(self) -> bool {
        matches!(
            self,
            Self::BuiltinEarpiece
                | Self::BuiltinMic
                | Self::BuiltinSpeaker
                | Self::BuiltinSpeakerSafe
                | Self::FmTuner
                | Self::RemoteSubmix
                | Self::Telephony
                | Self::VendorInternal
        )
    }
}

impl From<i32> for DeviceCategory {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltinEarpiece => write!(f, "Earpiece"),
            Self::BuiltinSpeaker => write!(f, "Speaker"),
            Self::WiredHeadset => write!(f, "Wired headset"),
            Self::WiredHeadphones => write!(f, "Wired headphones"),
            Self::BluetoothSco => write!(f, "Bluetooth (SCO)"),
            Self::BluetoothA2dp => write!(f, "Bluetooth"),
            Self::Hdmi => write!(f, "HDMI"),
            Self::UsbDevice => write!(f, "USB"),
            Self::BuiltinMic => write!(f, "Microphone"),
            Self::FmTuner => write!(f, "FM tuner"),
            Self::Telephony => write!(f, "Telephony"),
            Self::UsbHeadset => write!(f, "USB headset"),
            Self::HearingAid => write!(f, "Hearing aid"),
            Self::BuiltinSpeakerSafe => write!(f, "Speaker (safe)"),
            Self::RemoteSubmix => write!(f, "Remote submix"),
            Self::BleHeadset => write!(f, "Bluetooth LE headset"),
            Self::BleSpeaker => write!(f, "Bluetooth LE speaker"),
            Self::VendorInternal => write!(f, "Internal"),
            Self::Other(code) => write!(f, "Type {}", code),
        }
    }
}

/// An audio device as reported by an add/remove notification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    /// Display name reported by the host, untrimmed.
    pub display_name: String,
    /// Raw category code.
    pub category_code: i32,
}

impl DeviceDescriptor {
    /// Create a descriptor.
    pub fn new(display_name: impl Into<String>, category_code: i32) -> Self {
        Self {
            display_name: display_name.into(),
            category_code,
        }
    }

    /// The device identity: its display name without surrounding whitespace.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.display_name.trim()
    }

    /// Typed view of the category code.
    #[must_use]
    pub fn category(&self) -> DeviceCategory {
        DeviceCategory::from_code(self.category_code)
    }
}

/// Notification that the host output volume changed.
///
/// The tracker only uses this as a refresh trigger; the percentage is
/// carried for presentation layers that want to render it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeChangeEvent {
    /// Current volume in percent, if the source knows it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub percent: Option<u8>,
}

/// One device connection session.
///
/// While the device is connected `disconnected_time` and `duration` are
/// `None`. [`ConnectionRecord::finalize`] produces the completed copy that
/// goes to the history store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionRecord {
    /// Row id assigned by the history store; `None` until persisted.
    pub id: Option<i64>,
    /// Trimmed device display name.
    pub device_name: String,
    /// Raw category code of the device.
    pub device_type: i32,
    /// When the device was first observed connected (ms since epoch).
    pub connected_time: i64,
    /// When the device was removed (ms since epoch).
    pub disconnected_time: Option<i64>,
    /// Connection length in ms.
    pub duration: Option<i64>,
    /// Calendar date (`YYYY-MM-DD`) the session started on.
    pub date: String,
}

impl ConnectionRecord {
    /// Open a new active session.
    pub fn open(
        device_name: impl Into<String>,
        device_type: i32,
        connected_time: i64,
        date: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            device_name: device_name.into(),
            device_type,
            connected_time,
            disconnected_time: None,
            duration: None,
            date: date.into(),
        }
    }

    /// Whether the session is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.disconnected_time.is_none()
    }

    /// Build the completed record for a session ending at `now`.
    ///
    /// A `now` earlier than `connected_time` is clamped so the duration is
    /// never negative.
    ///
    /// # Examples
    ///
    /// ```
    /// use headwatch_types::ConnectionRecord;
    ///
    /// let open = ConnectionRecord::open("Buds", 8, 1000, "2024-05-01");
    /// let done = open.finalize(5000);
    /// assert_eq!(done.disconnected_time, Some(5000));
    /// assert_eq!(done.duration, Some(4000));
    /// ```
    #[must_use]
    pub fn finalize(&self, now: i64) -> Self {
        let disconnected = now.max(self.connected_time);
        Self {
            disconnected_time: Some(disconnected),
            duration: Some(disconnected - self.connected_time),
            ..self.clone()
        }
    }

    /// Typed view of the device category.
    #[must_use]
    pub fn category(&self) -> DeviceCategory {
        DeviceCategory::from_code(self.device_type)
    }
}

/// Aggregated history for one device on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSummary {
    /// Device name.
    pub device_name: String,
    /// Category code of the most recent session.
    pub device_type: i32,
    /// Sum of session durations in ms.
    pub total_duration: i64,
    /// Number of sessions.
    pub count: u32,
}

/// Compute the `YYYY-MM-DD` calendar date of a millisecond timestamp.
///
/// # Examples
///
/// ```
/// use headwatch_types::calendar_date;
/// use time::UtcOffset;
///
/// assert_eq!(calendar_date(0, UtcOffset::UTC).unwrap(), "1970-01-01");
/// ```
pub fn calendar_date(timestamp_ms: i64, offset: UtcOffset) -> ParseResult<String> {
    let nanos = i128::from(timestamp_ms) * 1_000_000;
    let at = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|_| ParseError::InvalidTimestamp(timestamp_ms))?;
    format_date(at.to_offset(offset).date())
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> ParseResult<String> {
    date.format(format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::InvalidDate(date.to_string()))
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(value: &str) -> ParseResult<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::InvalidDate(value.to_string()))
}
