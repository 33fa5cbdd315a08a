//! # Network Join
//!
//! The device must be on the network before the image can be fetched. Joining
//! is a capability ([`NetworkLink`]) so the controller does not care whether it
//! talks to a WiFi radio or, on a desktop, simply probes the image server.
//!
//! Joining never blocks forever: [`join_bounded`] limits every attempt and the
//! number of attempts, then reports [`LinkError::Exhausted`] so the cycle can
//! carry on to the status overlay and sleep.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

/// Errors reported while joining the network.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The endpoint URL has no usable host or port
    #[error("cannot derive a host from {0}")]
    BadEndpoint(String),

    /// A single attempt failed
    #[error("join failed: {0}")]
    Io(#[from] std::io::Error),

    /// A single attempt ran past its limit
    #[error("join attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Every attempt failed
    #[error("network unavailable after {0} attempts")]
    Exhausted(u32),
}

/// Something that brings the device onto the network.
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Try once to get connected. Implementations may block; the caller bounds
    /// the call with a timeout.
    async fn join(&mut self) -> Result<(), LinkError>;
}

/// Host link: "connected" means the image server accepts TCP connections.
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    /// Build a probe for the host and port of `url`.
    pub fn for_url(url: &str) -> Result<Self, LinkError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| LinkError::BadEndpoint(url.into()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| LinkError::BadEndpoint(url.into()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| LinkError::BadEndpoint(url.into()))?;
        Ok(Self {
            address: format!("{}:{}", host, port),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl NetworkLink for TcpProbe {
    async fn join(&mut self) -> Result<(), LinkError> {
        let stream = TcpStream::connect(&self.address).await?;
        if let Ok(local) = stream.local_addr() {
            log::info!("Connected, local address {}", local);
        }
        Ok(())
    }
}

/// Join with at most `attempts` tries of at most `timeout` each.
///
/// Returns the attempt number that succeeded.
pub async fn join_bounded<N: NetworkLink>(
    link: &mut N,
    attempts: u32,
    timeout: Duration,
    retry_delay: Duration,
) -> Result<u32, LinkError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        let result = match time::timeout(timeout, link.join()).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout(timeout)),
        };
        match result {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                log::warn!("Network join attempt {}/{} failed: {}", attempt, attempts, e);
                if attempt < attempts {
                    time::sleep(retry_delay).await;
                }
            }
        }
    }
    Err(LinkError::Exhausted(attempts))
}
