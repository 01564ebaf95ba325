//! # streamzip
//!
//! Streaming extraction of ZIP archive members and gzip streams over
//! pluggable byte sources.
//!
//! The same engine runs against local files, HTTP servers with Range
//! support, in-memory buffers, and one-shot byte streams: sources implement
//! the [`Tokenizer`] trait, and [`ZipEngine`] picks its traversal strategy
//! from the source's capabilities. Random-access sources are read via the
//! central directory, so only the selected members are fetched; sequential
//! sources are scanned forward, including entries whose compressed size is
//! only recorded after the payload.
//!
//! ## Features
//!
//! - Extract selected members without materializing the whole archive
//! - Random-access and forward-only traversal behind one filter contract
//! - STORED, DEFLATE, and DEFLATE64 entry payloads
//! - Lazy gzip inflation via [`GzipInflater`]
//!
//! ## Example
//!
//! ```no_run
//! use streamzip::{EntryFilter, EntryHeader, HttpRangeTokenizer, Verdict, ZipEngine};
//!
//! struct PrintXml;
//!
//! #[async_trait::async_trait]
//! impl EntryFilter for PrintXml {
//!     async fn filter(&mut self, header: &EntryHeader) -> Verdict {
//!         if header.filename.ends_with(".xml") {
//!             Verdict::extract()
//!         } else {
//!             Verdict::skip()
//!         }
//!     }
//!
//!     async fn handle(&mut self, header: &EntryHeader, data: Vec<u8>) -> anyhow::Result<()> {
//!         println!("{}: {} bytes", header.filename, data.len());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let url = "https://example.com/archive.zip".to_string();
//!     let mut tokenizer = HttpRangeTokenizer::connect(url).await?;
//!     ZipEngine::new(&mut tokenizer).unzip(&mut PrintXml).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gzip;
mod inflate;
pub mod io;
pub mod zip;

pub use error::{Error, Result};
pub use gzip::GzipInflater;
pub use io::{BufferTokenizer, FileTokenizer, HttpRangeTokenizer, StreamTokenizer, Tokenizer};
pub use zip::{CentralEntry, CompressionMethod, EntryFilter, EntryHeader, Verdict, ZipEngine};
