mod buffer;
mod file;
mod http;
mod stream;

pub use buffer::BufferTokenizer;
pub use file::FileTokenizer;
pub use http::HttpRangeTokenizer;
pub use stream::StreamTokenizer;

use crate::error::{Error, Result};
use async_trait::async_trait;

/// A positioned byte source with lookahead.
///
/// A tokenizer maintains a current byte position and serves reads and peeks
/// relative to it. Sources backed by a file, a buffer, or an HTTP server
/// with Range support additionally offer random access ([`seek`] and a known
/// [`total_size`]); one-shot streams do not, and consumers are expected to
/// probe [`supports_random_access`] and fall back to forward-only traversal.
///
/// When `may_be_less` is false, `read` and `peek` either fill the whole
/// buffer or fail with [`Error::UnexpectedEndOfStream`], which is
/// distinguishable from every other I/O failure.
///
/// [`seek`]: Tokenizer::seek
/// [`total_size`]: Tokenizer::total_size
/// [`supports_random_access`]: Tokenizer::supports_random_access
#[async_trait]
pub trait Tokenizer: Send {
    /// Fill up to `buf.len()` bytes without advancing the position.
    async fn peek(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize>;

    /// Fill up to `buf.len()` bytes and advance the position by the number
    /// of bytes read.
    async fn read(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize>;

    /// Advance the position by `count` bytes without surfacing the data.
    ///
    /// Sequential sources must consume the bytes and fail with
    /// [`Error::UnexpectedEndOfStream`] if the source ends early; random
    /// access sources may simply move the cursor.
    async fn ignore(&mut self, count: u64) -> Result<()>;

    /// The current byte offset from the start of the source.
    fn position(&self) -> u64;

    /// Whether [`Tokenizer::seek`] and [`Tokenizer::total_size`] are usable.
    fn supports_random_access(&self) -> bool {
        false
    }

    /// Total size of the source in bytes, when known.
    fn total_size(&self) -> Option<u64> {
        None
    }

    /// Move the position to an absolute byte offset.
    async fn seek(&mut self, position: u64) -> Result<()> {
        let _ = position;
        Err(Error::RandomAccessUnsupported)
    }
}
