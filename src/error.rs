//! Error types for archive parsing and extraction.

use std::string::FromUtf8Error;
use thiserror::Error;

/// The error type for all tokenizer, engine, and inflater operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The signature check at the start of `unzip` failed.
    #[error("not a zip archive")]
    NotAZip,

    /// An encrypted-archive marker was encountered where an entry was expected.
    #[error("archive is encrypted")]
    EncryptedArchive,

    /// A peeked 4-byte value matched no known record at a position where one
    /// was required.
    #[error("unexpected signature {signature:#010x} at offset {position}")]
    UnexpectedSignature { signature: u32, position: u64 },

    /// A required signature inside a record did not match.
    #[error("corrupt archive: bad {0} signature")]
    CorruptArchive(&'static str),

    /// The source ended mid-record or mid-payload.
    #[error("archive is truncated")]
    TruncatedArchive,

    /// The external decompressor reported an error.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A user entry handler failed; traversal is aborted.
    #[error("entry handler failed")]
    Handler(#[source] anyhow::Error),

    /// An entry filename was not valid UTF-8.
    #[error("entry filename is not valid UTF-8")]
    Filename(#[from] FromUtf8Error),

    /// The distinguished end-of-stream condition reported by tokenizers when
    /// an exact read cannot be satisfied.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// `seek` was called on a source without random access.
    #[error("random access is not supported by this source")]
    RandomAccessUnsupported,

    /// Underlying I/O failure, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Underlying HTTP failure, propagated unchanged.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for the distinguished end-of-stream condition.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::UnexpectedEndOfStream)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
