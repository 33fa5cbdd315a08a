//! # Image Fetching
//!
//! This module downloads the raw packed image from the fixed endpoint into a
//! caller-supplied buffer. The buffer never grows: the body is streamed in and
//! copied chunk by chunk, and the copy stops as soon as the buffer is full.
//!
//! ## Data Source
//! - **Request**: plain `GET`, no headers, no authentication
//! - **Body**: exactly `width * height / 2` bytes of packed 4-bit pixels
//!
//! ## Streaming Loop
//! 1. **Start**: send the request; anything but `200 OK` ends the fetch with 0 bytes
//! 2. **Poll**: wait for the next chunk; an empty chunk means "nothing yet",
//!    so pause for the poll interval and ask again
//! 3. **Copy**: copy `min(chunk, space left)` bytes at the current offset
//! 4. **Stop**: buffer full, connection closed, or `Content-Length` consumed
//!
//! ## Bounds
//! Every wait is limited: the response head by the request timeout, each chunk
//! by the stall timeout and the whole fetch by the total timeout. A limit that
//! expires ends the loop with whatever has been received, which the caller
//! treats as a failed fetch because the count will not match.
//!
//! There are no retries. One failed attempt ends the fetch for this cycle.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::FetchConfig;
use crate::FetchResult;

/// Errors that end a fetch before any body bytes were kept.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (DNS, connect, protocol)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection-level failure reported by a transport
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered with something other than 200 OK
    #[error("server returned status {0}")]
    Status(u16),

    /// No response head within the request timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// An open response whose body can be read piece by piece.
#[allow(async_fn_in_trait)]
pub trait ResponseStream {
    /// HTTP status code of the response
    fn status(&self) -> u16;

    /// Declared body length, if the server sent one
    fn content_length(&self) -> Option<u64>;

    /// Next piece of the body; `None` once the connection is closed.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchError>;
}

/// Issues GET requests.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Response: ResponseStream;

    async fn get(&self, url: &str) -> Result<Self::Response, FetchError>;
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    type Response = reqwest::Response;

    async fn get(&self, url: &str) -> Result<Self::Response, FetchError> {
        Ok(self.client.get(url).send().await?)
    }
}

impl ResponseStream for reqwest::Response {
    fn status(&self) -> u16 {
        reqwest::Response::status(self).as_u16()
    }

    fn content_length(&self) -> Option<u64> {
        reqwest::Response::content_length(self)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        Ok(reqwest::Response::chunk(self).await?)
    }
}

/// Download `url` into `buffer` and report how many bytes arrived.
///
/// `buffer.len()` is the capacity. The result never exceeds it, and equals it
/// only when the buffer was completely filled; in that case the function
/// returns at once without waiting for the connection to close.
///
/// Failures before the body started yield [`FetchResult::FAILED`]; a
/// connection that drops mid-body yields the short count received so far.
///
/// # Example
/// ```no_run
/// use comic_frame_lib::config::Config;
/// use comic_frame_lib::fetcher::{fetch, HttpTransport};
/// use comic_frame_lib::ImageBuffer;
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::default();
/// let transport = HttpTransport::new(&config.fetch)?;
/// let mut buffer = ImageBuffer::try_new(config.panel.width, config.panel.height)?;
/// let url = &config.endpoint.url;
/// let result = fetch(&transport, url, buffer.as_mut_slice(), &config.fetch).await;
/// println!("received {} bytes", result.bytes_received);
/// # Ok(())
/// # }
/// ```
pub async fn fetch<T: Transport>(
    transport: &T,
    url: &str,
    buffer: &mut [u8],
    limits: &FetchConfig,
) -> FetchResult {
    match stream_into(transport, url, buffer, limits).await {
        Ok(received) => FetchResult::new(received),
        Err(e) => {
            log::warn!("Http GET failed: {}", e);
            FetchResult::FAILED
        }
    }
}

// -- Private Implementation --

async fn stream_into<T: Transport>(
    transport: &T,
    url: &str,
    buffer: &mut [u8],
    limits: &FetchConfig,
) -> Result<usize, FetchError> {
    let capacity = buffer.len();
    let deadline = Instant::now() + limits.total_timeout();

    log::info!("Http request: GET {} with buffer of size {}", url, capacity);

    let head_limit = deadline.min(Instant::now() + limits.request_timeout());
    let mut response = time::timeout_at(head_limit, transport.get(url))
        .await
        .map_err(|_| FetchError::Timeout(limits.request_timeout()))??;

    let status = response.status();
    if status != 200 {
        return Err(FetchError::Status(status));
    }

    let content_length = response.content_length();
    let mut received = 0usize;

    loop {
        if content_length.is_some_and(|len| received as u64 >= len) {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            log::warn!("Fetch deadline reached after {} bytes", received);
            break;
        }

        let wait_limit = deadline.min(now + limits.stall_timeout());
        let chunk = match time::timeout_at(wait_limit, response.next_chunk()).await {
            Ok(Ok(Some(chunk))) => chunk,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                log::warn!("Connection dropped after {} bytes: {}", received, e);
                break;
            }
            Err(_) => {
                log::warn!("No data arrived in time, stopping after {} bytes", received);
                break;
            }
        };

        if chunk.is_empty() {
            time::sleep(limits.poll_interval()).await;
            continue;
        }

        let take = chunk.len().min(capacity - received);
        buffer[received..received + take].copy_from_slice(&chunk[..take]);
        received += take;

        if received == capacity {
            return Ok(received);
        }
    }

    Ok(received)
}
