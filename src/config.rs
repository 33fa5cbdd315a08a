//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the frame-config.toml file.
//! It provides a centralized way to configure the image endpoint, panel geometry,
//! network and fetch bounds, sleep interval and status overlay.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::platform::WakeEdge;
use crate::SleepDuration;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "frame-config.toml";

/// Largest panel the frame and image buffers are sized for
pub const MAX_PANEL_PIXELS: u64 = 1 << 26;

/// Reasons a parsed configuration is rejected.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("endpoint url is empty")]
    EmptyUrl,
    #[error("panel width {0} must be even and non-zero")]
    PanelWidth(u32),
    #[error("panel height must be non-zero")]
    PanelHeight,
    #[error("panel {0}x{1} exceeds {MAX_PANEL_PIXELS} pixels")]
    PanelArea(u32, u32),
    #[error("sleep duration must be non-zero")]
    SleepDuration,
}

/// Application configuration loaded from frame-config.toml
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Image server endpoint
    pub endpoint: EndpointConfig,
    /// Panel geometry
    pub panel: PanelConfig,
    /// Bounds on the image download
    pub fetch: FetchConfig,
    /// Bounds on the network join
    pub network: NetworkConfig,
    /// Duty cycle and wake sources
    pub sleep: SleepConfig,
    /// Battery sensor and warning level
    pub battery: BatteryConfig,
    /// Status overlay options
    pub status: StatusConfig,
    /// Where the host panel puts committed frames
    pub output: OutputConfig,
}

/// Image server configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Fixed URL answering GET with the raw packed image
    pub url: String,
}

/// Panel geometry in pixels
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelConfig {
    pub width: u32,
    pub height: u32,
}

/// Fetch bounds
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Limit for connecting and receiving the response head
    pub request_timeout_secs: u64,
    /// Limit for any single wait on body data
    pub stall_timeout_secs: u64,
    /// Limit for the whole fetch, head and body
    pub total_timeout_secs: u64,
    /// Pause between polls while no data is available
    pub poll_interval_ms: u64,
}

/// Network join bounds
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Limit for a single join attempt
    pub join_timeout_secs: u64,
    /// Attempts before giving up for this cycle
    pub join_attempts: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
}

/// Duty cycle configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Fixed interval between activations
    pub duration_secs: u64,
    /// Pause before restarting after an allocation failure
    pub restart_delay_secs: u64,
    /// Optional GPIO that wakes the device (e.g. a wake button)
    pub wake_pin: Option<u8>,
    /// Edge of `wake_pin` that triggers the wake
    pub wake_edge: WakeEdge,
}

/// Battery reading and warning configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Show the voltage on every refresh (true) or only below `warning_volts`
    pub always_show: bool,
    /// Voltage under which the low-battery text is shown
    pub warning_volts: f32,
    /// sysfs `voltage_now` file (microvolts) for host sensors
    pub sysfs_path: Option<PathBuf>,
    /// Fixed reading used when no sensor is available
    pub fixed_volts: Option<f32>,
}

/// Status overlay configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Stamp the time of the last successful image update in the corner
    pub show_timestamp: bool,
}

/// Host panel output configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// PGM file written on every commit
    pub pgm_path: PathBuf,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            url: "http://192.168.178.49:8000/comic/inkplate".to_string(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            width: 1200, // Inkplate 10
            height: 825, // Inkplate 10
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            request_timeout_secs: 10,
            stall_timeout_secs: 10,
            total_timeout_secs: 120,
            poll_interval_ms: 1,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            join_timeout_secs: 15,
            join_attempts: 3,
            retry_delay_ms: 250,
        }
    }
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            duration_secs: 3600,
            restart_delay_secs: 5,
            wake_pin: None,
            wake_edge: WakeEdge::Falling,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        BatteryConfig {
            always_show: true,
            warning_volts: 4.1,
            sysfs_path: None,
            fixed_volts: None,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            show_timestamp: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            pgm_path: PathBuf::from("frame.pgm"),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl NetworkConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SleepConfig {
    pub fn duration(&self) -> SleepDuration {
        SleepDuration::from_secs(self.duration_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

impl Config {
    /// Load configuration from frame-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("Loaded configuration for endpoint: {}", config.endpoint.url);
                        config
                    }
                    Err(e) => {
                        log::warn!("Invalid configuration in {}: {}", path.display(), e);
                        log::warn!("Using default configuration");
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Invalid config file format: {}", e);
                    log::warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!(
                    "No config file at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Check the values the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.panel.width == 0 || self.panel.width % 2 != 0 {
            return Err(ConfigError::PanelWidth(self.panel.width));
        }
        if self.panel.height == 0 {
            return Err(ConfigError::PanelHeight);
        }
        if u64::from(self.panel.width) * u64::from(self.panel.height) > MAX_PANEL_PIXELS {
            return Err(ConfigError::PanelArea(self.panel.width, self.panel.height));
        }
        if self.sleep.duration_secs == 0 {
            return Err(ConfigError::SleepDuration);
        }
        Ok(())
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}
