//! The streaming ZIP engine.
//!
//! The engine reads an archive through a [`Tokenizer`] and picks one of two
//! traversal strategies at runtime:
//!
//! 1. When the source supports random access, the central directory at the
//!    tail of the archive is located and materialized, and entries are
//!    visited by seeking to each local header (the only strategy the
//!    format really intends, and the efficient one for HTTP Range sources).
//! 2. Otherwise the archive body is scanned forward, local header by local
//!    header. Entries written in streaming mode carry zero sizes in the
//!    header, so their payload length is only discoverable by scanning for
//!    the trailing data-descriptor signature.
//!
//! Both strategies dispatch entries through the same [`EntryFilter`]
//! contract, so callers are insulated from the capability split.

use async_trait::async_trait;

use super::records::{
    CentralFileHeader, CompressionMethod, DataDescriptor, EndOfCentralDirectory, EntryHeader,
    LocalFileHeader, Record, CENTRAL_FILE_HEADER, DATA_DESCRIPTOR, ENCRYPTED_MARKER,
    END_OF_CENTRAL_DIRECTORY, LOCAL_FILE_HEADER,
};
use crate::error::{Error, Result};
use crate::inflate;
use crate::io::Tokenizer;

/// Size of the engine's reusable scratch buffer, which bounds a single
/// data-descriptor scan window and the end-of-central-directory tail read.
pub const SYNC_BUFFER_LEN: usize = 256 * 1024;

/// How far into the archive tail the end-of-central-directory signature is
/// searched. Covers comments up to this length minus the record itself.
const EOCD_SCAN_LEN: u64 = 16 * 1024;

/// What to do with one archive entry, as decided by an [`EntryFilter`].
#[derive(Debug, Clone, Copy)]
pub struct Verdict {
    /// Decompress the payload and pass it to [`EntryFilter::handle`].
    /// When false the payload is skipped without decompression.
    pub extract: bool,
    /// Terminate traversal once this entry (payload and trailer) has been
    /// fully consumed.
    pub stop: bool,
}

impl Verdict {
    pub fn extract() -> Self {
        Self {
            extract: true,
            stop: false,
        }
    }

    pub fn skip() -> Self {
        Self {
            extract: false,
            stop: false,
        }
    }

    pub fn and_stop(mut self) -> Self {
        self.stop = true;
        self
    }
}

/// Per-entry dispatch contract shared by both traversal strategies.
///
/// [`filter`](Self::filter) runs exactly once per entry, before the payload
/// is consumed. [`handle`](Self::handle) runs only for extracted entries,
/// receives fully decompressed bytes, and always completes before the next
/// entry's `filter` call, so implementations may mutate their own state
/// without further synchronization. Both methods may suspend.
#[async_trait]
pub trait EntryFilter: Send {
    async fn filter(&mut self, header: &EntryHeader) -> Verdict;

    /// Consume one extracted entry. The default discards the data, which
    /// suits filters that only inspect headers.
    async fn handle(&mut self, header: &EntryHeader, data: Vec<u8>) -> anyhow::Result<()> {
        let _ = (header, data);
        Ok(())
    }
}

/// One central-directory entry, with the local header offset it points at.
#[derive(Debug, Clone)]
pub struct CentralEntry {
    pub header: EntryHeader,
    pub local_header_offset: u64,
}

/// Streaming ZIP reader over a borrowed tokenizer.
///
/// The engine borrows the tokenizer for its lifetime; the caller owns the
/// source and closes it after traversal. A 256 KiB scratch buffer is
/// allocated once per engine and reused across entries.
///
/// ## Example
///
/// ```no_run
/// use streamzip::{EntryFilter, EntryHeader, FileTokenizer, Verdict, ZipEngine};
///
/// struct GrabManifest(Option<Vec<u8>>);
///
/// #[async_trait::async_trait]
/// impl EntryFilter for GrabManifest {
///     async fn filter(&mut self, header: &EntryHeader) -> Verdict {
///         if header.filename == "META-INF/MANIFEST.MF" {
///             Verdict::extract().and_stop()
///         } else {
///             Verdict::skip()
///         }
///     }
///
///     async fn handle(&mut self, _: &EntryHeader, data: Vec<u8>) -> anyhow::Result<()> {
///         self.0 = Some(data);
///         Ok(())
///     }
/// }
///
/// # async fn example() -> streamzip::Result<()> {
/// let mut tokenizer = FileTokenizer::open("plugin.jar")?;
/// let mut filter = GrabManifest(None);
/// ZipEngine::new(&mut tokenizer).unzip(&mut filter).await?;
/// # Ok(())
/// # }
/// ```
pub struct ZipEngine<'a, T: Tokenizer> {
    tokenizer: &'a mut T,
    sync_buffer: Box<[u8]>,
}

impl<'a, T: Tokenizer> ZipEngine<'a, T> {
    pub fn new(tokenizer: &'a mut T) -> Self {
        Self {
            tokenizer,
            sync_buffer: vec![0u8; SYNC_BUFFER_LEN].into_boxed_slice(),
        }
    }

    /// Whether the bytes at the current position look like a ZIP archive.
    ///
    /// Peeks four bytes; the position does not move. A source shorter than
    /// a signature is simply not a ZIP.
    pub async fn is_zip(&mut self) -> Result<bool> {
        let mut signature = [0u8; 4];
        let n = self.tokenizer.peek(&mut signature, true).await?;
        Ok(n == 4 && u32::from_le_bytes(signature) == LOCAL_FILE_HEADER)
    }

    /// Locate the end-of-central-directory record near the archive tail.
    ///
    /// Reads up to 16 KiB from the end of the source and scans backwards
    /// for the signature. The backwards direction matters: the record is
    /// followed by a variable-length comment, so a forward scan could match
    /// signature bytes inside the comment of a crafted archive.
    ///
    /// Returns `None` when the source has no random access or no signature
    /// is found.
    pub async fn find_end_of_central_directory(&mut self) -> Result<Option<u64>> {
        if !self.tokenizer.supports_random_access() {
            return Ok(None);
        }
        let size = match self.tokenizer.total_size() {
            Some(size) => size,
            None => return Ok(None),
        };
        let scan_len = EOCD_SCAN_LEN.min(size) as usize;
        if scan_len < EndOfCentralDirectory::LEN {
            return Ok(None);
        }

        let saved = self.tokenizer.position();
        let tail_start = size - scan_len as u64;
        self.tokenizer.seek(tail_start).await?;
        self.tokenizer
            .read(&mut self.sync_buffer[..scan_len], false)
            .await
            .map_err(truncated)?;
        self.tokenizer.seek(saved).await?;

        let signature = END_OF_CENTRAL_DIRECTORY.to_le_bytes();
        for i in (0..=scan_len - signature.len()).rev() {
            if self.sync_buffer[i..i + signature.len()] == signature {
                return Ok(Some(tail_start + i as u64));
            }
        }
        Ok(None)
    }

    /// Materialize the central directory, when the source allows it.
    ///
    /// Returns `None` on sources without random access or without a
    /// locatable end-of-central-directory record; traversal then falls back
    /// to the forward scan. The tokenizer position is restored on success.
    pub async fn read_central_directory(&mut self) -> Result<Option<Vec<CentralEntry>>> {
        let eocd_offset = match self.find_end_of_central_directory().await? {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let saved = self.tokenizer.position();
        self.tokenizer.seek(eocd_offset).await?;
        let eocd: EndOfCentralDirectory = self.read_record().await?;
        if eocd.signature != END_OF_CENTRAL_DIRECTORY {
            return Err(Error::CorruptArchive("end of central directory"));
        }

        self.tokenizer.seek(eocd.cd_offset as u64).await?;
        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            let header: CentralFileHeader = self.read_record().await?;
            if header.signature != CENTRAL_FILE_HEADER {
                return Err(Error::CorruptArchive("central directory file header"));
            }
            let filename = self.read_filename(header.filename_len).await?;
            self.ignore_bytes(header.extra_len as u64 + header.comment_len as u64)
                .await?;
            entries.push(CentralEntry {
                local_header_offset: header.local_header_offset as u64,
                header: EntryHeader::from_central(&header, filename),
            });
        }

        self.tokenizer.seek(saved).await?;
        Ok(Some(entries))
    }

    /// Traverse the archive, dispatching every entry through `filter`.
    ///
    /// Uses the central directory when the source supports random access
    /// and one can be located; otherwise scans forward from the current
    /// position. On either path, a clean return leaves the tokenizer at the
    /// byte offset following the last fully consumed record.
    pub async fn unzip<F: EntryFilter>(&mut self, filter: &mut F) -> Result<()> {
        if !self.is_zip().await? {
            return Err(Error::NotAZip);
        }
        match self.read_central_directory().await? {
            Some(entries) => self.extract_with_directory(&entries, filter).await,
            None => self.extract_forward(filter).await,
        }
    }

    /// Central-directory-driven traversal: seek to each local header, read
    /// exactly the compressed size the central record declares.
    async fn extract_with_directory<F: EntryFilter>(
        &mut self,
        entries: &[CentralEntry],
        filter: &mut F,
    ) -> Result<()> {
        for entry in entries {
            let verdict = filter.filter(&entry.header).await;
            if verdict.extract {
                self.tokenizer.seek(entry.local_header_offset).await?;
                let local: LocalFileHeader = self.read_record().await?;
                if local.signature != LOCAL_FILE_HEADER {
                    return Err(Error::CorruptArchive("local file header"));
                }
                self.ignore_bytes(local.filename_len as u64 + local.extra_len as u64)
                    .await?;

                // The central record's size is authoritative; the local one
                // may be zero for entries written in streaming mode.
                let mut payload = vec![0u8; entry.header.compressed_size as usize];
                self.tokenizer
                    .read(&mut payload, false)
                    .await
                    .map_err(truncated)?;
                let data = decode_payload(&entry.header, payload)?;
                filter
                    .handle(&entry.header, data)
                    .await
                    .map_err(Error::Handler)?;
            }
            if verdict.stop {
                break;
            }
        }
        Ok(())
    }

    /// Forward streaming traversal for sources without random access.
    async fn extract_forward<F: EntryFilter>(&mut self, filter: &mut F) -> Result<()> {
        loop {
            let mut signature = [0u8; 4];
            let n = self.tokenizer.peek(&mut signature, true).await?;
            if n == 0 {
                // End of input at a record boundary terminates cleanly.
                return Ok(());
            }
            if n < 4 {
                return Err(Error::TruncatedArchive);
            }
            match u32::from_le_bytes(signature) {
                LOCAL_FILE_HEADER => {}
                CENTRAL_FILE_HEADER => return Ok(()),
                ENCRYPTED_MARKER => return Err(Error::EncryptedArchive),
                signature => {
                    return Err(Error::UnexpectedSignature {
                        signature,
                        position: self.tokenizer.position(),
                    })
                }
            }

            let local: LocalFileHeader = self.read_record().await?;
            let filename = self.read_filename(local.filename_len).await?;
            let header = EntryHeader::from_local(&local, filename);

            let verdict = filter.filter(&header).await;
            self.ignore_bytes(local.extra_len as u64).await?;

            // A zero compressed size together with the descriptor flag means
            // the writer did not know the size up front; the payload extent
            // must be discovered by scanning. A known size wins even when
            // the flag is set.
            let streamed = local.has_data_descriptor() && local.compressed_size == 0;
            let payload = if streamed {
                self.scan_streamed_payload(verdict.extract).await?
            } else if verdict.extract {
                let mut payload = vec![0u8; local.compressed_size as usize];
                self.tokenizer
                    .read(&mut payload, false)
                    .await
                    .map_err(truncated)?;
                Some(payload)
            } else {
                self.ignore_bytes(local.compressed_size as u64).await?;
                None
            };

            if let Some(raw) = payload {
                let data = decode_payload(&header, raw)?;
                filter.handle(&header, data).await.map_err(Error::Handler)?;
            }

            if local.has_data_descriptor() {
                let descriptor: DataDescriptor = self.read_record().await?;
                if descriptor.signature != DATA_DESCRIPTOR {
                    return Err(Error::CorruptArchive("data descriptor"));
                }
                // The descriptor's size fields are accepted as-is.
            }

            if verdict.stop {
                return Ok(());
            }
        }
    }

    /// Consume a payload of unknown length by scanning for the trailing
    /// data-descriptor signature in sync-buffer-sized peek windows.
    ///
    /// On a miss the whole window is consumed and the scan continues; a
    /// short window means the source is exhausted, and the missing
    /// descriptor surfaces as a truncation error at the caller's next read.
    /// Returns the captured payload, or `None` when `capture` is false.
    async fn scan_streamed_payload(&mut self, capture: bool) -> Result<Option<Vec<u8>>> {
        let mut captured = if capture { Some(Vec::new()) } else { None };
        let signature = DATA_DESCRIPTOR.to_le_bytes();
        loop {
            let n = self.tokenizer.peek(&mut self.sync_buffer, true).await?;
            let window = &self.sync_buffer[..n];
            let hit = window
                .windows(signature.len())
                .position(|candidate| candidate == signature);
            let consume = hit.unwrap_or(n);
            if let Some(out) = captured.as_mut() {
                out.extend_from_slice(&window[..consume]);
            }
            self.tokenizer
                .ignore(consume as u64)
                .await
                .map_err(truncated)?;
            if hit.is_some() || n < self.sync_buffer.len() {
                return Ok(captured);
            }
        }
    }

    /// Read one fixed-length record through the sync buffer.
    async fn read_record<R: Record>(&mut self) -> Result<R> {
        self.tokenizer
            .read(&mut self.sync_buffer[..R::LEN], false)
            .await
            .map_err(truncated)?;
        R::parse(&self.sync_buffer[..R::LEN])
    }

    async fn read_filename(&mut self, len: u16) -> Result<String> {
        let mut bytes = vec![0u8; len as usize];
        self.tokenizer
            .read(&mut bytes, false)
            .await
            .map_err(truncated)?;
        Ok(String::from_utf8(bytes)?)
    }

    async fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.tokenizer.ignore(count).await.map_err(truncated)
    }
}

/// Route one compressed payload per the entry's method: stored payloads
/// pass through untouched, everything else goes to the decompressor.
fn decode_payload(header: &EntryHeader, payload: Vec<u8>) -> Result<Vec<u8>> {
    match header.method {
        CompressionMethod::Stored => Ok(payload),
        method => inflate::inflate(method, &payload, header.uncompressed_size as usize),
    }
}

/// End-of-stream inside a record or payload means the archive was cut off.
fn truncated(err: Error) -> Error {
    match err {
        Error::UnexpectedEndOfStream => Error::TruncatedArchive,
        other => other,
    }
}
