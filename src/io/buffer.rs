use async_trait::async_trait;

use super::Tokenizer;
use crate::error::{Error, Result};

/// Tokenizer over an in-memory byte slice, with random access.
pub struct BufferTokenizer<'a> {
    data: &'a [u8],
    position: u64,
}

impl<'a> BufferTokenizer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        let start = (self.position as usize).min(self.data.len());
        &self.data[start..]
    }

    fn copy_out(&self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let remaining = self.remaining();
        let n = remaining.len().min(buf.len());
        if !may_be_less && n < buf.len() {
            return Err(Error::UnexpectedEndOfStream);
        }
        buf[..n].copy_from_slice(&remaining[..n]);
        Ok(n)
    }
}

#[async_trait]
impl Tokenizer for BufferTokenizer<'_> {
    async fn peek(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        self.copy_out(buf, may_be_less)
    }

    async fn read(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let n = self.copy_out(buf, may_be_less)?;
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
        Some(self.data.len() as u64)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }
}
