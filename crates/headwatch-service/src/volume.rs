//! Volume bands for the console indicator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse volume band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeLevel {
    /// 0%.
    Silent,
    /// 1% to 25%.
    Low,
    /// 26% to 50%.
    Medium,
    /// 51% to 80%.
    High,
    /// Above 80%.
    Max,
}

impl VolumeLevel {
    /// Band for a volume percentage. Values above 100 count as `Max`.
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0 => Self::Silent,
            1..=25 => Self::Low,
            26..=50 => Self::Medium,
            51..=80 => Self::High,
            _ => Self::Max,
        }
    }

    /// Short bar glyph.
    #[must_use]
    pub fn bar(self) -> &'static str {
        match self {
            Self::Silent => "[    ]",
            Self::Low => "[#   ]",
            Self::Medium => "[##  ]",
            Self::High => "[### ]",
            Self::Max => "[####]",
        }
    }
}

impl fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Max => write!(f, "max"),
        }
    }
}
