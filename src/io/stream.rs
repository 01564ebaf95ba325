use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Tokenizer;
use crate::error::{Error, Result};

const FILL_CHUNK: usize = 8 * 1024;

/// Sequential tokenizer over any [`AsyncRead`] source.
///
/// Peeks are served from an internal lookahead buffer that grows as needed,
/// so arbitrarily large peeks work against one-shot streams. Random access
/// is not available; `seek` fails and `total_size` is unknown.
pub struct StreamTokenizer<R> {
    reader: R,
    lookahead: Vec<u8>,
    position: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> StreamTokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lookahead: Vec::new(),
            position: 0,
            eof: false,
        }
    }

    /// Grow the lookahead buffer to at least `want` bytes or end of stream.
    async fn fill_lookahead(&mut self, want: usize) -> Result<()> {
        let mut chunk = [0u8; FILL_CHUNK];
        while self.lookahead.len() < want && !self.eof {
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.lookahead.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    async fn peek_into(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        self.fill_lookahead(buf.len()).await?;
        let n = self.lookahead.len().min(buf.len());
        if !may_be_less && n < buf.len() {
            return Err(Error::UnexpectedEndOfStream);
        }
        buf[..n].copy_from_slice(&self.lookahead[..n]);
        Ok(n)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Tokenizer for StreamTokenizer<R> {
    async fn peek(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        self.peek_into(buf, may_be_less).await
    }

    async fn read(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let n = self.peek_into(buf, may_be_less).await?;
        self.lookahead.drain(..n);
        self.position += n as u64;
        Ok(n)
    }

    async fn ignore(&mut self, count: u64) -> Result<()> {
        let buffered = (self.lookahead.len() as u64).min(count);
        self.lookahead.drain(..buffered as usize);
        self.position += buffered;

        let mut left = count - buffered;
        let mut chunk = [0u8; FILL_CHUNK];
        while left > 0 {
            let want = (chunk.len() as u64).min(left) as usize;
            let n = self.reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(Error::UnexpectedEndOfStream);
            }
            self.position += n as u64;
            left -= n as u64;
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}
