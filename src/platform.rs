//! # Sleep Platform
//!
//! Deep sleep ends the activation. What survives it is whatever the platform
//! keeps on its own, which for this device is only the reason it woke up.
//!
//! ## Host Emulation
//! [`HostPlatform`] maps the device's sleep/wake cycle onto processes:
//! - the wake cause comes from the `COMIC_FRAME_WAKE_CAUSE` environment variable
//!   (absent on a fresh start, so a cold boot reads as `Other`)
//! - deep sleep blocks for the armed interval and then replaces the process with
//!   a fresh copy of itself, with the variable set to `timer`
//! - restart replaces the process with the variable removed
//!
//! Pin wake has no host equivalent; arming it is logged and otherwise ignored.

use std::env;
use std::process::Command;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::{SleepDuration, WakeCause};

/// Environment variable carrying the wake cause into the next activation
pub const WAKE_CAUSE_VAR: &str = "COMIC_FRAME_WAKE_CAUSE";

/// Signal edge that wakes the device on an external pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeEdge {
    Rising,
    Falling,
}

/// Board services around deep sleep.
pub trait SleepPlatform {
    /// Why this activation started.
    fn wake_cause(&self) -> WakeCause;

    fn enable_wake_on_timer(&mut self, duration: SleepDuration);

    fn enable_wake_on_pin(&mut self, pin: u8, edge: WakeEdge);

    /// Power down until an armed wake source fires. Never returns; the next
    /// wake is a new activation.
    fn enter_deep_sleep(&mut self) -> !;

    /// Full reset of the board.
    fn restart(&mut self) -> !;
}

/// Process-based emulation of the board's sleep services.
pub struct HostPlatform {
    wake_cause: WakeCause,
    timer: Option<SleepDuration>,
    pin: Option<(u8, WakeEdge)>,
}

impl HostPlatform {
    /// Read the wake cause left by the previous activation.
    pub fn from_env() -> Self {
        let wake_cause = env::var(WAKE_CAUSE_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(WakeCause::Other);
        Self::with_wake_cause(wake_cause)
    }

    pub fn with_wake_cause(wake_cause: WakeCause) -> Self {
        Self {
            wake_cause,
            timer: None,
            pin: None,
        }
    }

    pub fn armed_timer(&self) -> Option<SleepDuration> {
        self.timer
    }

    pub fn armed_pin(&self) -> Option<(u8, WakeEdge)> {
        self.pin
    }

    /// Replace the running process with a fresh activation.
    fn reactivate(&self, wake_cause: Option<WakeCause>) -> ! {
        let program = match env::current_exe() {
            Ok(program) => program,
            Err(e) => {
                log::error!("Cannot locate own executable: {}", e);
                std::process::exit(1);
            }
        };
        let mut command = Command::new(program);
        command.args(env::args_os().skip(1));
        match wake_cause {
            Some(cause) => command.env(WAKE_CAUSE_VAR, cause.to_string()),
            None => command.env_remove(WAKE_CAUSE_VAR),
        };
        exec(command)
    }
}

impl SleepPlatform for HostPlatform {
    fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }

    fn enable_wake_on_timer(&mut self, duration: SleepDuration) {
        log::info!("Wake timer armed for {} us", duration.timer_micros());
        self.timer = Some(duration);
    }

    fn enable_wake_on_pin(&mut self, pin: u8, edge: WakeEdge) {
        log::warn!(
            "Wake on pin {} ({:?} edge) is not available on the host, ignoring",
            pin,
            edge
        );
        self.pin = Some((pin, edge));
    }

    fn enter_deep_sleep(&mut self) -> ! {
        match self.timer {
            Some(duration) => {
                log::info!("Going to deep sleep for {} seconds", duration.as_duration().as_secs());
                thread::sleep(duration.as_duration());
                self.reactivate(Some(WakeCause::Timer))
            }
            None => {
                log::warn!("Deep sleep without a wake timer, sleeping until killed");
                loop {
                    thread::park();
                }
            }
        }
    }

    fn restart(&mut self) -> ! {
        log::warn!("Restarting");
        self.reactivate(None)
    }
}

#[cfg(unix)]
fn exec(mut command: Command) -> ! {
    use std::os::unix::process::CommandExt;

    let error = command.exec();
    log::error!("Failed to start the next activation: {}", error);
    std::process::exit(1)
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> ! {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(0)),
        Err(error) => {
            log::error!("Failed to start the next activation: {}", error);
            std::process::exit(1)
        }
    }
}
