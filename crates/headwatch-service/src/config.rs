//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use headwatch_core::TrackerConfig;

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracker settings.
    pub tracker: TrackerSection,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - The alert threshold is between 1 second and 7 days
    /// - The host model name, if set, is not blank
    /// - The UTC offset, if set, is within ±18 hours
    /// - The storage path is not empty
    ///
    /// # Example
    ///
    /// ```
    /// use headwatch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.tracker.validate());
        errors.extend(self.storage.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Minimum alert threshold in seconds.
pub const MIN_ALERT_THRESHOLD_SECS: u64 = 1;
/// Maximum alert threshold in seconds (7 days).
pub const MAX_ALERT_THRESHOLD_SECS: u64 = 7 * 24 * 60 * 60;
/// Largest accepted UTC offset in minutes (18 hours).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

fn default_alert_threshold_secs() -> u64 {
    60 * 60
}

/// Tracker configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// Seconds a device may stay connected before an alert is raised.
    pub alert_threshold_secs: u64,
    /// Arm per-device timers.
    pub duration_watching: bool,
    /// Name of this host as reported by its own audio devices.
    /// Defaults to the system hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_model_name: Option<String>,
    /// Offset used for calendar dates. Defaults to the local offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            alert_threshold_secs: default_alert_threshold_secs(),
            duration_watching: false,
            host_model_name: None,
            utc_offset_minutes: None,
        }
    }
}

impl TrackerSection {
    /// Validate tracker configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.alert_threshold_secs < MIN_ALERT_THRESHOLD_SECS {
            errors.push(ValidationError {
                field: "tracker.alert_threshold_secs".to_string(),
                message: format!(
                    "alert threshold {} is too short (minimum {} second)",
                    self.alert_threshold_secs, MIN_ALERT_THRESHOLD_SECS
                ),
            });
        } else if self.alert_threshold_secs > MAX_ALERT_THRESHOLD_SECS {
            errors.push(ValidationError {
                field: "tracker.alert_threshold_secs".to_string(),
                message: format!(
                    "alert threshold {} is too long (maximum {} seconds / 7 days)",
                    self.alert_threshold_secs, MAX_ALERT_THRESHOLD_SECS
                ),
            });
        }

        if let Some(name) = &self.host_model_name
            && name.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "tracker.host_model_name".to_string(),
                message: "host model name cannot be blank (omit it to use the hostname)"
                    .to_string(),
            });
        }

        if let Some(minutes) = self.utc_offset_minutes
            && !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&minutes)
        {
            errors.push(ValidationError {
                field: "tracker.utc_offset_minutes".to_string(),
                message: format!(
                    "offset {} is out of range (maximum ±{} minutes)",
                    minutes, MAX_UTC_OFFSET_MINUTES
                ),
            });
        }

        errors
    }

    /// The configured threshold as a duration.
    pub fn alert_threshold(&self) -> Duration {
        Duration::from_secs(self.alert_threshold_secs)
    }

    /// Build the tracker configuration.
    ///
    /// `local_offset` is used when no offset is configured. The host model
    /// name falls back to the system hostname; if that cannot be read no
    /// host name filtering takes place.
    pub fn to_tracker_config(&self, local_offset: UtcOffset) -> Result<TrackerConfig, ConfigError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let utc_offset = match self.utc_offset_minutes {
            Some(minutes) => offset_from_minutes(minutes).ok_or_else(|| {
                ConfigError::Validation(vec![ValidationError {
                    field: "tracker.utc_offset_minutes".to_string(),
                    message: format!("offset {} is out of range", minutes),
                }])
            })?,
            None => local_offset,
        };

        let mut config = TrackerConfig::new()
            .alert_threshold(self.alert_threshold())
            .duration_watching(self.duration_watching)
            .utc_offset(utc_offset);
        if let Some(name) = self.host_model_name.clone().or_else(system_hostname) {
            config = config.host_model_name(name);
        }
        Ok(config)
    }
}

/// UTC offset for a whole number of minutes, if representable.
pub fn offset_from_minutes(minutes: i32) -> Option<UtcOffset> {
    let seconds = minutes.checked_mul(60)?;
    UtcOffset::from_whole_seconds(seconds).ok()
}

fn system_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: headwatch_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `tracker.alert_threshold_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("headwatch")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tracker.alert_threshold_secs, 3600);
        assert!(!config.tracker.duration_watching);
        assert!(config.tracker.host_model_name.is_none());
        assert_eq!(config.storage.path, headwatch_store::default_db_path());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [tracker]
            alert_threshold_secs = 1800
            duration_watching = true
            host_model_name = "ThinkPad X1"
            utc_offset_minutes = -300

            [storage]
            path = "/data/headwatch.db"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.tracker.alert_threshold_secs, 1800);
        assert!(config.tracker.duration_watching);
        assert_eq!(config.tracker.host_model_name.as_deref(), Some("ThinkPad X1"));
        assert_eq!(config.tracker.utc_offset_minutes, Some(-300));
        assert_eq!(config.storage.path, PathBuf::from("/data/headwatch.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[tracker]\nduration_watching = true\n").unwrap();
        assert!(config.tracker.duration_watching);
        assert_eq!(config.tracker.alert_threshold_secs, 3600);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("service.toml");

        let config = Config {
            tracker: TrackerSection {
                alert_threshold_secs: 90,
                duration_watching: true,
                host_model_name: Some("Pixel 8".to_string()),
                utc_offset_minutes: None,
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/history.db"),
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/service.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("headwatch/service.toml"));
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let mut section = TrackerSection::default();
        section.alert_threshold_secs = 0;
        let errors = section.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        section.alert_threshold_secs = MAX_ALERT_THRESHOLD_SECS + 1;
        let errors = section.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too long"));

        section.alert_threshold_secs = MAX_ALERT_THRESHOLD_SECS;
        assert!(section.validate().is_empty());
    }

    #[test]
    fn test_offset_and_name_validation() {
        let section = TrackerSection {
            host_model_name: Some("  ".to_string()),
            utc_offset_minutes: Some(19 * 60),
            ..Default::default()
        };
        let errors = section.validate();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "tracker.host_model_name");
        assert_eq!(errors[1].field, "tracker.utc_offset_minutes");
    }

    #[test]
    fn test_extreme_offsets_rejected() {
        let input = "[tracker]\nutc_offset_minutes = -2147483648\n";
        let config: Config = toml::from_str(input).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tracker.utc_offset_minutes"));

        for minutes in [i32::MIN, i32::MAX, -(MAX_UTC_OFFSET_MINUTES + 1)] {
            let section = TrackerSection {
                utc_offset_minutes: Some(minutes),
                ..Default::default()
            };
            assert_eq!(section.validate().len(), 1);
            assert!(section.to_tracker_config(UtcOffset::UTC).is_err());
        }

        assert_eq!(offset_from_minutes(i32::MIN), None);
        assert_eq!(
            offset_from_minutes(-MAX_UTC_OFFSET_MINUTES),
            UtcOffset::from_hms(-18, 0, 0).ok()
        );
    }

    #[test]
    fn test_storage_path_validation() {
        let config = Config {
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.path"));
    }

    #[test]
    fn test_to_tracker_config() {
        let section = TrackerSection {
            alert_threshold_secs: 120,
            duration_watching: true,
            host_model_name: Some("Pixel 8".to_string()),
            utc_offset_minutes: Some(90),
        };
        let tracker = section.to_tracker_config(UtcOffset::UTC).unwrap();
        assert_eq!(tracker.alert_threshold, Duration::from_secs(120));
        assert!(tracker.duration_watching);
        assert_eq!(tracker.host_model_name.as_deref(), Some("Pixel 8"));
        assert_eq!(tracker.utc_offset, offset!(+1:30));
    }

    #[test]
    fn test_to_tracker_config_falls_back_to_local_offset() {
        let tracker = TrackerSection::default()
            .to_tracker_config(offset!(-7))
            .unwrap();
        assert_eq!(tracker.utc_offset, offset!(-7));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError {
            field: "tracker.alert_threshold_secs".to_string(),
            message: "too short".to_string(),
        };
        assert_eq!(error.to_string(), "tracker.alert_threshold_secs: too short");
    }
}
