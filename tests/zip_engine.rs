//! End-to-end traversal tests over synthesized archives.

use async_trait::async_trait;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

use streamzip::{
    BufferTokenizer, EntryFilter, EntryHeader, Error, StreamTokenizer, Tokenizer, Verdict,
    ZipEngine,
};

const LFH_SIG: u32 = 0x04034B50;
const CDFH_SIG: u32 = 0x02014B50;
const EOCD_SIG: u32 = 0x06054B50;
const DD_SIG: u32 = 0x08074B50;
const ENCRYPTED_SIG: u32 = 0xE011CFD0;

const ODP_MIMETYPE: &str = "application/vnd.oasis.opendocument.presentation";
const CONTENT_TYPES_XML: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Types/>";

/// How an entry records its payload extent.
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Sizes in the local header, no data descriptor.
    Plain,
    /// Sizes zeroed in the local header, trailing data descriptor.
    Streaming,
    /// Descriptor flag set but sizes also recorded in the local header.
    DescriptorKnownSize,
}

struct Entry {
    name: &'static str,
    data: Vec<u8>,
    method: u16,
    mode: Mode,
}

impl Entry {
    fn plain(name: &'static str, data: impl Into<Vec<u8>>, method: u16) -> Self {
        Self {
            name,
            data: data.into(),
            method,
            mode: Mode::Plain,
        }
    }

    fn streaming(name: &'static str, data: impl Into<Vec<u8>>, method: u16) -> Self {
        Self {
            name,
            data: data.into(),
            method,
            mode: Mode::Streaming,
        }
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn deflated(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Raw DEFLATE stream made only of stored blocks, decodable by both the
/// DEFLATE and DEFLATE64 decoders; stands in for real method-9 payloads.
fn stored_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunks = data.chunks(0xFFFF).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        out.push(if last { 0x01 } else { 0x00 });
        let len = chunk.len() as u16;
        push_u16(&mut out, len);
        push_u16(&mut out, !len);
        out.extend_from_slice(chunk);
    }
    out
}

fn compress(method: u16, data: &[u8]) -> Vec<u8> {
    match method {
        0 => data.to_vec(),
        8 => deflated(data),
        9 => stored_blocks(data),
        other => panic!("no encoder for method {other}"),
    }
}

fn build_archive(entries: &[Entry], with_central: bool, comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    for entry in entries {
        offsets.push(out.len() as u32);
        let payload = compress(entry.method, &entry.data);
        let flags: u16 = if entry.mode == Mode::Plain { 0 } else { 0x0008 };
        let record_sizes = entry.mode != Mode::Streaming;

        push_u32(&mut out, LFH_SIG);
        push_u16(&mut out, 20); // min version
        push_u16(&mut out, flags);
        push_u16(&mut out, entry.method);
        push_u16(&mut out, 0); // time
        push_u16(&mut out, 0); // date
        push_u32(&mut out, 0); // crc32
        if record_sizes {
            push_u32(&mut out, payload.len() as u32);
            push_u32(&mut out, entry.data.len() as u32);
        } else {
            push_u32(&mut out, 0);
            push_u32(&mut out, 0);
        }
        push_u16(&mut out, entry.name.len() as u16);
        push_u16(&mut out, 0); // extra len
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&payload);

        if entry.mode != Mode::Plain {
            push_u32(&mut out, DD_SIG);
            push_u32(&mut out, 0); // crc32
            push_u32(&mut out, payload.len() as u32);
            push_u32(&mut out, entry.data.len() as u32);
        }
    }

    if !with_central {
        return out;
    }

    let cd_offset = out.len() as u32;
    for (entry, offset) in entries.iter().zip(&offsets) {
        let payload_len = compress(entry.method, &entry.data).len() as u32;
        let flags: u16 = if entry.mode == Mode::Plain { 0 } else { 0x0008 };
        push_u32(&mut out, CDFH_SIG);
        push_u16(&mut out, 20); // version made by
        push_u16(&mut out, 20); // min version
        push_u16(&mut out, flags);
        push_u16(&mut out, entry.method);
        push_u16(&mut out, 0); // time
        push_u16(&mut out, 0); // date
        push_u32(&mut out, 0); // crc32
        push_u32(&mut out, payload_len);
        push_u32(&mut out, entry.data.len() as u32);
        push_u16(&mut out, entry.name.len() as u16);
        push_u16(&mut out, 0); // extra len
        push_u16(&mut out, 0); // comment len
        push_u16(&mut out, 0); // disk number
        push_u16(&mut out, 0); // internal attrs
        push_u32(&mut out, 0); // external attrs
        push_u32(&mut out, *offset);
        out.extend_from_slice(entry.name.as_bytes());
    }
    let cd_size = out.len() as u32 - cd_offset;

    push_u32(&mut out, EOCD_SIG);
    push_u16(&mut out, 0); // disk number
    push_u16(&mut out, 0); // disk with cd
    push_u16(&mut out, entries.len() as u16);
    push_u16(&mut out, entries.len() as u16);
    push_u32(&mut out, cd_size);
    push_u32(&mut out, cd_offset);
    push_u16(&mut out, comment.len() as u16);
    out.extend_from_slice(comment);
    out
}

fn sample_entries() -> Vec<Entry> {
    vec![
        Entry::plain("mimetype", ODP_MIMETYPE, 0),
        Entry::plain("[Content_Types].xml", CONTENT_TYPES_XML, 8),
        Entry::plain("word/document.xml", CONTENT_TYPES_XML.repeat(40), 8),
    ]
}

/// Extracts everything, recording (filename, bytes) in order.
#[derive(Default)]
struct Collect {
    entries: Vec<(String, Vec<u8>)>,
}

#[async_trait]
impl EntryFilter for Collect {
    async fn filter(&mut self, _: &EntryHeader) -> Verdict {
        Verdict::extract()
    }

    async fn handle(&mut self, header: &EntryHeader, data: Vec<u8>) -> anyhow::Result<()> {
        self.entries.push((header.filename.clone(), data));
        Ok(())
    }
}

/// Skips everything, counting filter invocations.
#[derive(Default)]
struct IgnoreAll {
    seen: usize,
}

#[async_trait]
impl EntryFilter for IgnoreAll {
    async fn filter(&mut self, _: &EntryHeader) -> Verdict {
        self.seen += 1;
        Verdict::skip()
    }
}

/// Extracts every entry up to `stop_index`, then stops.
struct StopAt {
    stop_index: usize,
    filtered: usize,
    handled: usize,
}

#[async_trait]
impl EntryFilter for StopAt {
    async fn filter(&mut self, _: &EntryHeader) -> Verdict {
        let index = self.filtered;
        self.filtered += 1;
        if index == self.stop_index {
            Verdict::extract().and_stop()
        } else {
            Verdict::extract()
        }
    }

    async fn handle(&mut self, _: &EntryHeader, _: Vec<u8>) -> anyhow::Result<()> {
        self.handled += 1;
        Ok(())
    }
}

async fn collect_seek(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut tokenizer = BufferTokenizer::new(archive);
    let mut filter = Collect::default();
    ZipEngine::new(&mut tokenizer)
        .unzip(&mut filter)
        .await
        .unwrap();
    filter.entries
}

async fn collect_stream(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut tokenizer = StreamTokenizer::new(archive);
    let mut filter = Collect::default();
    ZipEngine::new(&mut tokenizer)
        .unzip(&mut filter)
        .await
        .unwrap();
    filter.entries
}

#[tokio::test]
async fn central_directory_path_extracts_entries() {
    let archive = build_archive(&sample_entries(), true, b"");
    let extracted = collect_seek(&archive).await;

    assert_eq!(extracted.len(), 3);
    assert_eq!(extracted[0].0, "mimetype");
    assert_eq!(extracted[0].1, ODP_MIMETYPE.as_bytes());
    assert_eq!(extracted[1].0, "[Content_Types].xml");
    assert!(String::from_utf8(extracted[1].1.clone())
        .unwrap()
        .starts_with("<?xml version=\"1.0\""));
}

#[tokio::test]
async fn forward_scan_extracts_entries() {
    let archive = build_archive(&sample_entries(), true, b"");
    let extracted = collect_stream(&archive).await;

    assert_eq!(extracted.len(), 3);
    assert_eq!(extracted[0].1, ODP_MIMETYPE.as_bytes());
    assert_eq!(extracted[1].1, CONTENT_TYPES_XML.as_bytes());
}

#[tokio::test]
async fn both_paths_agree_on_extracted_bytes() {
    let mut entries = sample_entries();
    entries.push(Entry::streaming("data/stream.xml", CONTENT_TYPES_XML, 8));
    let archive = build_archive(&entries, true, b"");

    let seeked = collect_seek(&archive).await;
    let streamed = collect_stream(&archive).await;
    assert_eq!(seeked, streamed);
}

#[tokio::test]
async fn streaming_entries_scan_to_the_descriptor() {
    let entries = vec![
        Entry::streaming("[Content_Types].xml", CONTENT_TYPES_XML, 8),
        Entry::streaming("stored.bin", b"raw bytes".to_vec(), 0),
        Entry::plain("tail.txt", b"after the streamed pair".to_vec(), 0),
    ];
    let archive = build_archive(&entries, true, b"");
    let extracted = collect_stream(&archive).await;

    assert_eq!(extracted.len(), 3);
    assert_eq!(extracted[0].1, CONTENT_TYPES_XML.as_bytes());
    assert_eq!(extracted[1].1, b"raw bytes");
    assert_eq!(extracted[2].1, b"after the streamed pair");
}

#[tokio::test]
async fn descriptor_flag_with_known_size_uses_the_sized_path() {
    // A payload containing the descriptor signature would derail a scan;
    // the recorded size must win over the descriptor flag.
    let mut tricky = b"leading".to_vec();
    tricky.extend_from_slice(&DD_SIG.to_le_bytes());
    tricky.extend_from_slice(b"trailing");
    let entries = vec![Entry {
        name: "tricky.bin",
        data: tricky.clone(),
        method: 0,
        mode: Mode::DescriptorKnownSize,
    }];
    let archive = build_archive(&entries, true, b"");

    let extracted = collect_stream(&archive).await;
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].1, tricky);
}

#[tokio::test]
async fn zero_byte_entries_extract_as_empty() {
    let entries = vec![
        Entry::plain("empty.txt", Vec::new(), 0),
        Entry::plain("sibling.txt", b"x".to_vec(), 0),
    ];
    let archive = build_archive(&entries, true, b"");

    for extracted in [collect_seek(&archive).await, collect_stream(&archive).await] {
        assert_eq!(extracted[0], ("empty.txt".to_string(), Vec::new()));
        assert_eq!(extracted[1].1, b"x");
    }
}

#[tokio::test]
async fn deflate64_entries_extract() {
    let data = b"deflate64 member payload ".repeat(100);
    let entries = vec![Entry::plain("big.bin", data.clone(), 9)];
    let archive = build_archive(&entries, true, b"");

    assert_eq!(collect_seek(&archive).await[0].1, data);
    assert_eq!(collect_stream(&archive).await[0].1, data);
}

#[tokio::test]
async fn ignore_all_touches_every_entry() {
    let mut entries = sample_entries();
    entries.push(Entry::streaming("streamed.xml", CONTENT_TYPES_XML, 8));
    let archive = build_archive(&entries, true, b"");

    let mut tokenizer = BufferTokenizer::new(&archive);
    let mut filter = IgnoreAll::default();
    ZipEngine::new(&mut tokenizer)
        .unzip(&mut filter)
        .await
        .unwrap();
    assert_eq!(filter.seen, 4);

    let mut tokenizer = StreamTokenizer::new(archive.as_slice());
    let mut filter = IgnoreAll::default();
    ZipEngine::new(&mut tokenizer)
        .unzip(&mut filter)
        .await
        .unwrap();
    assert_eq!(filter.seen, 4);
}

#[tokio::test]
async fn stop_ends_traversal_after_the_current_entry() {
    let archive = build_archive(&sample_entries(), true, b"");

    for seek in [true, false] {
        let mut filter = StopAt {
            stop_index: 1,
            filtered: 0,
            handled: 0,
        };
        if seek {
            let mut tokenizer = BufferTokenizer::new(&archive);
            ZipEngine::new(&mut tokenizer)
                .unzip(&mut filter)
                .await
                .unwrap();
        } else {
            let mut tokenizer = StreamTokenizer::new(archive.as_slice());
            ZipEngine::new(&mut tokenizer)
                .unzip(&mut filter)
                .await
                .unwrap();
        }
        assert_eq!(filter.filtered, 2);
        assert_eq!(filter.handled, 2);
    }
}

#[tokio::test]
async fn archive_comment_does_not_hide_the_central_directory() {
    let comment = vec![b'#'; 600];
    let archive = build_archive(&sample_entries(), true, &comment);
    let extracted = collect_seek(&archive).await;
    assert_eq!(extracted.len(), 3);
}

#[tokio::test]
async fn forward_scan_handles_archives_without_a_central_directory() {
    let archive = build_archive(&sample_entries(), false, b"");
    let extracted = collect_stream(&archive).await;
    assert_eq!(extracted.len(), 3);
    assert_eq!(extracted[2].1, CONTENT_TYPES_XML.repeat(40).as_bytes());
}

#[tokio::test]
async fn extracting_twice_yields_identical_bytes() {
    let archive = build_archive(&sample_entries(), true, b"");
    assert_eq!(collect_seek(&archive).await, collect_seek(&archive).await);
}

#[tokio::test]
async fn read_central_directory_restores_the_position() {
    let archive = build_archive(&sample_entries(), true, b"");
    let mut tokenizer = BufferTokenizer::new(&archive);
    let mut engine = ZipEngine::new(&mut tokenizer);

    let entries = engine.read_central_directory().await.unwrap().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].header.filename, "mimetype");
    assert_eq!(entries[0].local_header_offset, 0);
    assert_eq!(tokenizer.position(), 0);
}

#[tokio::test]
async fn encrypted_marker_is_reported() {
    let mut archive = build_archive(&[Entry::plain("ok.txt", b"fine".to_vec(), 0)], false, b"");
    archive.extend_from_slice(&ENCRYPTED_SIG.to_le_bytes());
    archive.extend_from_slice(&[0u8; 32]);

    let mut tokenizer = StreamTokenizer::new(archive.as_slice());
    let err = ZipEngine::new(&mut tokenizer)
        .unzip(&mut Collect::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EncryptedArchive));
}

#[tokio::test]
async fn unknown_signature_is_reported_with_its_position() {
    let mut archive = build_archive(&[Entry::plain("ok.txt", b"fine".to_vec(), 0)], false, b"");
    let garbage_at = archive.len() as u64;
    archive.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());

    let mut tokenizer = StreamTokenizer::new(archive.as_slice());
    let err = ZipEngine::new(&mut tokenizer)
        .unzip(&mut Collect::default())
        .await
        .unwrap_err();
    match err {
        Error::UnexpectedSignature {
            signature,
            position,
        } => {
            assert_eq!(signature, 0xDEADBEEF);
            assert_eq!(position, garbage_at);
        }
        other => panic!("expected UnexpectedSignature, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_payload_is_reported() {
    let archive = build_archive(
        &[Entry::plain("cut.bin", vec![7u8; 4096], 0)],
        false,
        b"",
    );
    let cut = &archive[..archive.len() - 1024];

    let mut tokenizer = StreamTokenizer::new(cut);
    let err = ZipEngine::new(&mut tokenizer)
        .unzip(&mut Collect::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TruncatedArchive));
}

#[tokio::test]
async fn truncated_streamed_entry_is_reported() {
    // Streamed payload whose descriptor never arrives.
    let mut archive = build_archive(
        &[Entry::streaming("cut.xml", CONTENT_TYPES_XML, 8)],
        false,
        b"",
    );
    archive.truncate(archive.len() - 16); // drop the whole descriptor

    let mut tokenizer = StreamTokenizer::new(archive.as_slice());
    let err = ZipEngine::new(&mut tokenizer)
        .unzip(&mut Collect::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TruncatedArchive));
}

#[tokio::test]
async fn handler_errors_abort_traversal() {
    struct Failing;

    #[async_trait]
    impl EntryFilter for Failing {
        async fn filter(&mut self, _: &EntryHeader) -> Verdict {
            Verdict::extract()
        }

        async fn handle(&mut self, _: &EntryHeader, _: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("sink is full")
        }
    }

    let archive = build_archive(&sample_entries(), true, b"");
    let mut tokenizer = BufferTokenizer::new(&archive);
    let err = ZipEngine::new(&mut tokenizer)
        .unzip(&mut Failing)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Handler(_)));
}
