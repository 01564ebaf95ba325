//! GZIP member inflation as a lazy chunk stream.
//!
//! [`GzipInflater`] adapts a pull-based [`Tokenizer`] into a
//! [`Stream`](futures::Stream) of decompressed chunks: on each consumer
//! demand it pulls a small slice of compressed input and drives a
//! raw-DEFLATE state machine until at least one output chunk falls out.
//! The member header is parsed lazily on the first demand, and the
//! CRC32/ISIZE trailer is consumed (without verification) when the
//! DEFLATE stream ends.
//!
//! A source that ends mid-header, mid-body, or mid-trailer surfaces
//! [`Error::Decompression`] on the next demand rather than silently
//! closing the sequence. Dropping the stream cancels the work.

use flate2::{Decompress, FlushDecompress, Status};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};
use crate::io::Tokenizer;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const CM_DEFLATE: u8 = 8;

/// Header CRC present.
const FHCRC: u8 = 0x02;
/// Extra field present.
const FEXTRA: u8 = 0x04;
/// Original filename present.
const FNAME: u8 = 0x08;
/// Comment present.
const FCOMMENT: u8 = 0x10;

/// How much compressed input is pulled from the tokenizer per demand.
const PULL_CHUNK: usize = 1024;
/// Scratch size for one decompressor call.
const INFLATE_CHUNK: usize = 16 * 1024;
/// CRC32 + ISIZE.
const TRAILER_LEN: usize = 8;

/// Streaming gzip decompressor over a borrowed tokenizer.
///
/// ## Example
///
/// ```no_run
/// use futures::TryStreamExt;
/// use streamzip::{FileTokenizer, GzipInflater};
///
/// # async fn example() -> streamzip::Result<()> {
/// let mut tokenizer = FileTokenizer::open("notes.txt.gz")?;
/// let mut stream = GzipInflater::new(&mut tokenizer).inflate();
/// while let Some(chunk) = stream.try_next().await? {
///     print!("{}", String::from_utf8_lossy(&chunk));
/// }
/// # Ok(())
/// # }
/// ```
pub struct GzipInflater<'a, T: Tokenizer> {
    tokenizer: &'a mut T,
}

impl<'a, T: Tokenizer> GzipInflater<'a, T> {
    pub fn new(tokenizer: &'a mut T) -> Self {
        Self { tokenizer }
    }

    /// Lazy sequence of decompressed chunks.
    pub fn inflate(self) -> BoxStream<'a, Result<Vec<u8>>>
    where
        T: 'a,
    {
        let state = InflateState {
            tokenizer: self.tokenizer,
            decompress: Decompress::new(false),
            header_read: false,
            finished: false,
        };
        stream::try_unfold(state, |mut state| async move {
            Ok(state.next_chunk().await?.map(|chunk| (chunk, state)))
        })
        .boxed()
    }
}

struct InflateState<'a, T: Tokenizer> {
    tokenizer: &'a mut T,
    decompress: Decompress,
    header_read: bool,
    finished: bool,
}

impl<T: Tokenizer> InflateState<'_, T> {
    /// Produce the next decompressed chunk, or `None` on clean completion.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        if !self.header_read {
            self.read_header().await?;
            self.header_read = true;
        }

        let mut out = Vec::new();
        let mut input = [0u8; PULL_CHUNK];
        let mut scratch = [0u8; INFLATE_CHUNK];
        loop {
            let n = self.tokenizer.read(&mut input, true).await?;
            if n == 0 {
                return Err(Error::Decompression("truncated gzip stream".into()));
            }

            let mut offset = 0;
            while offset < n {
                let before_in = self.decompress.total_in();
                let before_out = self.decompress.total_out();
                let status = self
                    .decompress
                    .decompress(&input[offset..n], &mut scratch, FlushDecompress::None)
                    .map_err(|err| Error::Decompression(err.to_string()))?;
                let consumed = (self.decompress.total_in() - before_in) as usize;
                let produced = (self.decompress.total_out() - before_out) as usize;
                offset += consumed;
                out.extend_from_slice(&scratch[..produced]);

                match status {
                    Status::StreamEnd => {
                        self.read_trailer(n - offset).await?;
                        self.finished = true;
                        return Ok(if out.is_empty() { None } else { Some(out) });
                    }
                    Status::Ok | Status::BufError => {
                        if consumed == 0 && produced == 0 {
                            return Err(Error::Decompression("stalled gzip stream".into()));
                        }
                    }
                }
            }

            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    async fn read_header(&mut self) -> Result<()> {
        let mut fixed = [0u8; 10];
        self.read_exact(&mut fixed).await?;
        if fixed[0..2] != GZIP_MAGIC {
            return Err(Error::Decompression("not a gzip stream".into()));
        }
        if fixed[2] != CM_DEFLATE {
            return Err(Error::Decompression(format!(
                "unsupported gzip compression method {}",
                fixed[2]
            )));
        }

        let flags = fixed[3];
        if flags & FEXTRA != 0 {
            let mut len = [0u8; 2];
            self.read_exact(&mut len).await?;
            self.skip(u16::from_le_bytes(len) as u64).await?;
        }
        if flags & FNAME != 0 {
            self.skip_zero_terminated().await?;
        }
        if flags & FCOMMENT != 0 {
            self.skip_zero_terminated().await?;
        }
        if flags & FHCRC != 0 {
            self.skip(2).await?;
        }
        Ok(())
    }

    /// Consume the 8-byte trailer, part of which may already have been
    /// pulled along with the tail of the DEFLATE stream.
    async fn read_trailer(&mut self, already_read: usize) -> Result<()> {
        if already_read < TRAILER_LEN {
            let mut rest = [0u8; TRAILER_LEN];
            self.read_exact(&mut rest[..TRAILER_LEN - already_read])
                .await?;
        }
        Ok(())
    }

    async fn skip_zero_terminated(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            self.read_exact(&mut byte).await?;
            if byte[0] == 0 {
                return Ok(());
            }
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.tokenizer
            .read(buf, false)
            .await
            .map_err(gzip_truncated)?;
        Ok(())
    }

    async fn skip(&mut self, count: u64) -> Result<()> {
        self.tokenizer.ignore(count).await.map_err(gzip_truncated)
    }
}

/// A source that runs dry inside a gzip member is a decompression error,
/// never a clean close.
fn gzip_truncated(err: Error) -> Error {
    match err {
        Error::UnexpectedEndOfStream => Error::Decompression("truncated gzip stream".into()),
        other => other,
    }
}
