//! # Duty Cycle Controller
//!
//! One activation of the device, from wake to sleep:
//!
//! ```text
//! WAKE -> JOIN_NETWORK -> FETCH -> RENDER_SUCCESS | RENDER_SKIPPED
//!      -> STATUS_OVERLAY -> ARM_SLEEP -> (suspend)
//! ```
//!
//! [`CycleController::run_cycle`] walks every state up to and including
//! arming the wake sources and returns a [`CycleReport`].
//! [`CycleController::suspend`] then ends the activation: deep sleep after a
//! completed cycle, a delayed restart after an allocation failure.
//!
//! Only a failed allocation aborts the cycle. A network that never comes up or
//! an image that does not arrive complete skips the render; the battery line is
//! still drawn, the panel still committed and sleep still armed.

use std::thread;

use chrono::Local;
use thiserror::Error;

use crate::battery::BatterySensor;
use crate::config::Config;
use crate::fetcher::{self, Transport};
use crate::network::{self, LinkError, NetworkLink};
use crate::panel::Panel;
use crate::platform::SleepPlatform;
use crate::{renderer, status};
use crate::{AllocationError, FetchResult, ImageBuffer, SleepDuration, WakeCause};

/// Steps of one activation, in the order they can be visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Wake,
    JoinNetwork,
    Fetch,
    RenderSuccess,
    RenderSkipped,
    StatusOverlay,
    ArmSleep,
}

/// Everything that can go wrong in a cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    /// The network join never converged within its bounds
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[source] LinkError),

    /// Non-OK status, transport error or a body of the wrong size
    #[error("fetch failed: received {received} of {expected} bytes")]
    FetchFailed { received: usize, expected: usize },

    /// No memory for the image buffer; only a restart recovers
    #[error("allocation failed: {0}")]
    AllocationFailed(#[from] AllocationError),
}

/// What happened during one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub wake_cause: WakeCause,
    pub states: Vec<CycleState>,
    /// `None` when the fetch never started
    pub fetch: Option<FetchResult>,
    pub expected_bytes: usize,
    pub rendered: bool,
    pub battery_volts: Option<f32>,
    pub sleep: SleepDuration,
    /// Non-fatal failure that made the cycle skip the render
    pub failure: Option<CycleError>,
}

/// Runs activations with the capabilities it was handed.
pub struct CycleController<N, T, P, B, S> {
    config: Config,
    link: N,
    transport: T,
    panel: P,
    battery: B,
    platform: S,
}

impl<N, T, P, B, S> CycleController<N, T, P, B, S>
where
    N: NetworkLink,
    T: Transport,
    P: Panel,
    B: BatterySensor,
    S: SleepPlatform,
{
    pub fn new(config: Config, link: N, transport: T, panel: P, battery: B, platform: S) -> Self {
        Self {
            config,
            link,
            transport,
            panel,
            battery,
            platform,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn platform(&self) -> &S {
        &self.platform
    }

    /// Run one activation up to the point of sleeping.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let mut states = vec![CycleState::Wake];
        let wake_cause = self.platform.wake_cause();
        match wake_cause {
            WakeCause::Timer => log::info!("Wakeup reason: sleep timer"),
            WakeCause::ExternalPin => log::info!("Wakeup reason: external pin"),
            WakeCause::Other => log::info!("Wakeup reason: cold boot or reset"),
        }

        let (width, height) = (self.config.panel.width, self.config.panel.height);
        let expected_bytes = ImageBuffer::capacity_for(width, height) - 1;
        let mut fetch = None;
        let mut rendered = false;
        let mut failure = None;

        states.push(CycleState::JoinNetwork);
        let joined = network::join_bounded(
            &mut self.link,
            self.config.network.join_attempts,
            self.config.network.join_timeout(),
            self.config.network.retry_delay(),
        )
        .await;

        match joined {
            Ok(attempt) => {
                log::info!("Network joined on attempt {}", attempt);
                states.push(CycleState::Fetch);

                let mut buffer = ImageBuffer::try_new(width, height)?;
                log::info!("Allocated {} bytes for image retrieval", buffer.capacity());

                let result = fetcher::fetch(
                    &self.transport,
                    &self.config.endpoint.url,
                    buffer.as_mut_slice(),
                    &self.config.fetch,
                )
                .await;
                log::info!(
                    "Received bytes {}, expected {}",
                    result.bytes_received,
                    expected_bytes
                );
                fetch = Some(result);

                match buffer.payload(result) {
                    Some(payload) => {
                        log::info!("Rendering received image...");
                        renderer::render(&mut self.panel, payload);
                        rendered = true;
                        states.push(CycleState::RenderSuccess);
                    }
                    None => {
                        failure = Some(CycleError::FetchFailed {
                            received: result.bytes_received,
                            expected: expected_bytes,
                        });
                        states.push(CycleState::RenderSkipped);
                    }
                }
            }
            Err(e) => {
                log::warn!("Skipping image fetch: {}", e);
                failure = Some(CycleError::NetworkUnavailable(e));
                states.push(CycleState::RenderSkipped);
            }
        }

        states.push(CycleState::StatusOverlay);
        let battery_volts = match self.battery.read_voltage() {
            Ok(volts) => {
                log::info!("Battery level: {:.2} V", volts);
                Some(volts)
            }
            Err(e) => {
                log::warn!("Battery read failed: {}", e);
                None
            }
        };
        status::draw_battery(&mut self.panel, battery_volts, &self.config.battery);
        if rendered && self.config.status.show_timestamp {
            status::draw_timestamp(&mut self.panel, &Local::now());
        }
        if let Err(e) = self.panel.commit() {
            log::error!("Panel commit failed: {}", e);
        }

        states.push(CycleState::ArmSleep);
        let sleep = self.config.sleep.duration();
        self.platform.enable_wake_on_timer(sleep);
        if let Some(pin) = self.config.sleep.wake_pin {
            self.platform.enable_wake_on_pin(pin, self.config.sleep.wake_edge);
        }

        if let Some(failure) = &failure {
            log::warn!("Image not updated this cycle: {}", failure);
        }

        Ok(CycleReport {
            wake_cause,
            states,
            fetch,
            expected_bytes,
            rendered,
            battery_volts,
            sleep,
            failure,
        })
    }

    /// End the activation. Nothing after this runs in the same process.
    pub fn suspend(mut self, outcome: &Result<CycleReport, CycleError>) -> ! {
        match outcome {
            Ok(report) => {
                log::info!(
                    "Cycle done (rendered: {}), sleeping {} s",
                    report.rendered,
                    report.sleep.as_duration().as_secs()
                );
                self.platform.enter_deep_sleep()
            }
            Err(e) => {
                log::error!("Cycle aborted: {}", e);
                thread::sleep(self.config.sleep.restart_delay());
                self.platform.restart()
            }
        }
    }
}
