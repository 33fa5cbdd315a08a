//! # Comic Frame Core Library
//!
//! This library holds the per-activation pipeline of a battery-powered e-paper
//! picture frame. Each activation wakes, joins the network, fetches one raw
//! packed-pixel image into a bounded buffer, paints it, overlays the battery
//! state and arms a timed deep sleep. Nothing is carried in memory from one
//! activation to the next.
//!
//! ## Pipeline
//! 1. **Fetch** ([`fetcher`]): stream the response body into an [`ImageBuffer`]
//!    without ever writing past its capacity
//! 2. **Render** ([`renderer`]): map every byte's two nibbles to two adjacent
//!    pixels, reduced from 4 bits to the panel's 3-bit depth
//! 3. **Cycle** ([`cycle`]): classify the wake cause, run the two stages above,
//!    draw the status overlay, commit once and arm sleep
//!
//! ## Image Layout
//! The server sends exactly `width * height / 2` bytes. Byte `i` covers pixels
//! `(x, y)` and `(x + 1, y)` where `y = i / (width / 2)` and
//! `x = (i % (width / 2)) * 2`; the high nibble is the left pixel.
//!
//! ## Capabilities
//! The network join, HTTP transport, display, battery sensor and sleep
//! hardware are all traits handed to the [`cycle::CycleController`]. The host
//! implementations in this crate let the whole pipeline run on a desktop.

use std::collections::TryReserveError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

// Module declarations
pub mod battery;
pub mod config;
pub mod cycle;
pub mod fetcher;
pub mod network;
pub mod panel;
pub mod platform;
pub mod renderer;
pub mod status;

/// A frame or image buffer could not be allocated.
#[derive(Error, Debug)]
#[error("could not allocate {requested} bytes")]
pub struct AllocationError {
    pub requested: usize,
    #[source]
    source: TryReserveError,
}

/// Fixed-capacity receive buffer for one image.
///
/// Capacity is `width * height / 2 + 1`. The extra byte lets the caller tell
/// an exactly complete payload (`capacity - 1` bytes) apart from a server that
/// keeps sending: a full buffer means the body was longer than expected.
///
/// # Example
/// ```
/// use comic_frame_lib::ImageBuffer;
///
/// let buffer = ImageBuffer::try_new(4, 2).unwrap();
/// assert_eq!(buffer.capacity(), 5);
/// assert_eq!(buffer.expected_payload(), 4);
/// ```
#[derive(Debug)]
pub struct ImageBuffer {
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Capacity needed for a panel of the given size.
    pub fn capacity_for(width: u32, height: u32) -> usize {
        (width as usize).saturating_mul(height as usize) / 2 + 1
    }

    /// Allocate the buffer for a `width` x `height` panel.
    ///
    /// Allocation failure is reported instead of aborting so the caller can
    /// restart the device cleanly.
    pub fn try_new(width: u32, height: u32) -> Result<Self, AllocationError> {
        let requested = Self::capacity_for(width, height);
        let mut data = Vec::new();
        data.try_reserve_exact(requested)
            .map_err(|source| AllocationError { requested, source })?;
        data.resize(requested, 0);
        Ok(Self { data })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes a complete image occupies.
    pub fn expected_payload(&self) -> usize {
        self.data.len() - 1
    }

    /// Writable view for the fetcher.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The first `received` bytes, if that is exactly one complete image.
    ///
    /// Any other count yields `None`: bytes past a short read are stale and a
    /// full buffer means the body overran the expected size.
    pub fn payload(&self, received: FetchResult) -> Option<&[u8]> {
        (received.bytes_received == self.expected_payload())
            .then(|| &self.data[..received.bytes_received])
    }
}

/// Outcome of one fetch: how many bytes landed in the buffer.
///
/// Failures before the body started are reported as zero bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub bytes_received: usize,
}

impl FetchResult {
    pub const FAILED: FetchResult = FetchResult { bytes_received: 0 };

    pub fn new(bytes_received: usize) -> Self {
        Self { bytes_received }
    }
}

/// Why the device resumed execution.
///
/// Read once at the start of an activation and only logged or branched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCause {
    /// The sleep timer expired
    Timer,
    /// An external wake pin (button, touch pad) fired
    ExternalPin,
    /// Cold boot, reset or an unclassified source
    Other,
}

impl WakeCause {
    /// Classify an ESP-IDF `esp_sleep_source_t` value.
    pub fn from_sleep_source(code: u32) -> Self {
        match code {
            // EXT0, EXT1
            2 | 3 => WakeCause::ExternalPin,
            4 => WakeCause::Timer,
            // TOUCHPAD, GPIO
            5 | 7 => WakeCause::ExternalPin,
            _ => WakeCause::Other,
        }
    }
}

impl FromStr for WakeCause {
    type Err = std::convert::Infallible;

    /// Classify a wake-source name or numeric code; unknown input is `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u32>() {
            return Ok(Self::from_sleep_source(code));
        }
        Ok(match s.to_ascii_lowercase().as_str() {
            "timer" => WakeCause::Timer,
            "ext0" | "ext1" | "gpio" | "touchpad" | "pin" | "external-pin" => {
                WakeCause::ExternalPin
            }
            _ => WakeCause::Other,
        })
    }
}

impl fmt::Display for WakeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WakeCause::Timer => "timer",
            WakeCause::ExternalPin => "external-pin",
            WakeCause::Other => "other",
        };
        f.write_str(name)
    }
}

/// Fixed interval between two activations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepDuration(Duration);

impl SleepDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Value for the RTC sleep timer, which counts microseconds.
    pub fn timer_micros(&self) -> u64 {
        u64::try_from(self.0.as_micros()).unwrap_or(u64::MAX)
    }
}
