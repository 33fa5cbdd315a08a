//! # Battery voltage sensing
//!
//! The cell voltage is all the status overlay needs. On Linux hosts the
//! power-supply class exposes it in microvolts (`voltage_now`); boards without
//! a readable sensor can pin a fixed value from the config file.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::BatteryConfig;

#[derive(Error, Debug)]
pub enum BatteryError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected sensor value {0:?}")]
    Parse(String),
    #[error("no battery sensor configured")]
    Missing,
}

pub trait BatterySensor {
    /// Cell voltage in volts.
    fn read_voltage(&mut self) -> Result<f32, BatteryError>;
}

/// Sensor backed by a sysfs `voltage_now` file.
pub struct SysfsBattery {
    path: PathBuf,
}

impl SysfsBattery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BatterySensor for SysfsBattery {
    fn read_voltage(&mut self) -> Result<f32, BatteryError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| BatteryError::Read {
            path: self.path.clone(),
            source,
        })?;
        let microvolts: u64 = raw
            .trim()
            .parse()
            .map_err(|_| BatteryError::Parse(raw.trim().to_string()))?;
        Ok(microvolts as f32 / 1_000_000.0)
    }
}

/// Host sensor picked from the `[battery]` config section.
pub enum HostBattery {
    Sysfs(SysfsBattery),
    Fixed(f32),
    Absent,
}

impl HostBattery {
    pub fn from_config(config: &BatteryConfig) -> Self {
        match (&config.sysfs_path, config.fixed_volts) {
            (Some(path), _) => HostBattery::Sysfs(SysfsBattery::new(path.clone())),
            (None, Some(volts)) => HostBattery::Fixed(volts),
            (None, None) => HostBattery::Absent,
        }
    }
}

impl BatterySensor for HostBattery {
    fn read_voltage(&mut self) -> Result<f32, BatteryError> {
        match self {
            HostBattery::Sysfs(sensor) => sensor.read_voltage(),
            HostBattery::Fixed(volts) => Ok(*volts),
            HostBattery::Absent => Err(BatteryError::Missing),
        }
    }
}
