//! Decompression of compressed entry payloads.
//!
//! The engine is method-agnostic beyond its store/deflate split; this
//! module is the seam behind it, covering classic DEFLATE (method 8) and
//! DEFLATE64 (method 9).

use std::io::Read;

use deflate64::InflaterManaged;
use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};
use crate::zip::CompressionMethod;

const OUT_CHUNK: usize = 32 * 1024;

/// Decompress one complete entry payload.
///
/// `size_hint` is the uncompressed size from the entry header, used only to
/// presize the output; entries written in streaming mode may pass zero.
pub(crate) fn inflate(
    method: CompressionMethod,
    data: &[u8],
    size_hint: usize,
) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::Stored => Ok(data.to_vec()),
        CompressionMethod::Deflate => {
            // ZIP entries carry raw DEFLATE, not zlib or gzip wrapped.
            let mut decoder = DeflateDecoder::new(data);
            let mut out = Vec::with_capacity(size_hint);
            decoder
                .read_to_end(&mut out)
                .map_err(|err| Error::Decompression(err.to_string()))?;
            Ok(out)
        }
        CompressionMethod::Deflate64 => inflate_deflate64(data, size_hint),
        CompressionMethod::Unknown(method) => Err(Error::Decompression(format!(
            "unsupported compression method {method}"
        ))),
    }
}

fn inflate_deflate64(data: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut inflater = Box::new(InflaterManaged::new());
    let mut out = Vec::with_capacity(size_hint);
    let mut chunk = vec![0u8; OUT_CHUNK];
    let mut consumed = 0;

    while !inflater.finished() {
        let result = inflater.inflate(&data[consumed..], &mut chunk);
        consumed += result.bytes_consumed;
        if result.data_error {
            return Err(Error::Decompression("invalid deflate64 stream".into()));
        }
        out.extend_from_slice(&chunk[..result.bytes_written]);
        if result.bytes_written == 0 && result.bytes_consumed == 0 && !inflater.finished() {
            return Err(Error::Decompression("truncated deflate64 stream".into()));
        }
    }
    Ok(out)
}
