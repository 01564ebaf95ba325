//! HTTP Range request tokenizer for remote archives.
//!
//! Implements random-access reading from HTTP servers using the Range
//! request header (RFC 7233), so that selected members can be pulled out of
//! a large remote archive without downloading the whole file.

use async_trait::async_trait;
use reqwest::Client;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::Tokenizer;
use crate::error::{Error, Result};

/// Tokenizer over a remote file served with HTTP Range support.
///
/// ## Requirements
///
/// The remote server must:
/// - Support HTTP Range requests (indicated by `Accept-Ranges: bytes`)
/// - Provide a `Content-Length` header in HEAD responses
///
/// ## Features
///
/// - Automatic retry with backoff for transient network errors
/// - Transfer statistics for monitoring bandwidth usage
/// - Connection pooling via reqwest
///
/// ## Example
///
/// ```no_run
/// use streamzip::{HttpRangeTokenizer, Tokenizer};
///
/// # async fn example() -> streamzip::Result<()> {
/// let tok = HttpRangeTokenizer::connect("https://example.com/large.zip".to_string()).await?;
/// println!("remote size: {} bytes", tok.total_size().unwrap());
/// # Ok(())
/// # }
/// ```
pub struct HttpRangeTokenizer {
    /// HTTP client with connection pooling.
    client: Client,
    url: String,
    /// Total size of the remote file, from `Content-Length`.
    size: u64,
    position: u64,
    /// Cumulative bytes transferred from the network.
    transferred_bytes: AtomicU64,
    /// Maximum number of retries for failed range requests.
    max_retry: u32,
}

impl HttpRangeTokenizer {
    /// Probe the remote file and build a tokenizer for it.
    ///
    /// Sends a HEAD request to verify the server responds, check Range
    /// support via `Accept-Ranges`, and obtain the file size from
    /// `Content-Length`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP request fails, the server doesn't support Range
    /// requests, or no `Content-Length` is provided.
    pub async fn connect(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let resp = client.head(&url).send().await?.error_for_status()?;

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !accept_ranges.contains("bytes") {
            return Err(Error::RandomAccessUnsupported);
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "remote server did not return Content-Length",
                ))
            })?;

        Ok(Self {
            client,
            url,
            size,
            position: 0,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Cumulative number of bytes received from the server.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Fetch bytes at `offset` with Range requests, retrying transient
    /// failures with backoff. Returns fewer than `buf.len()` bytes only when
    /// the requested range extends past the end of the remote file.
    async fn read_range(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        // Clamp the end to the file size to avoid requesting beyond EOF.
        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let expected = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected {
            let start = offset + received as u64;
            let range = format!("bytes={start}-{end}");

            let result = self
                .client
                .get(&self.url)
                .header("Range", &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
                        return Err(Error::Io(io::Error::other(format!(
                            "range request failed with status {}",
                            resp.status()
                        ))));
                    }

                    let bytes = resp.bytes().await?;
                    let chunk_len = bytes.len().min(expected - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(e.into());
                    }
                    eprintln!(
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.max_retry, e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }
}

#[async_trait]
impl Tokenizer for HttpRangeTokenizer {
    async fn peek(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let n = self.read_range(self.position, buf).await?;
        if !may_be_less && n < buf.len() {
            return Err(Error::UnexpectedEndOfStream);
        }
        Ok(n)
    }

    async fn read(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let n = self.read_range(self.position, buf).await?;
        if !may_be_less && n < buf.len() {
            return Err(Error::UnexpectedEndOfStream);
        }
        self.position += n as u64;
        Ok(n)
    }

    async fn ignore(&mut self, count: u64) -> Result<()> {
        self.position += count;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn total_size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }
}
