mod engine;
pub(crate) mod records;

pub use engine::{CentralEntry, EntryFilter, Verdict, ZipEngine, SYNC_BUFFER_LEN};
pub use records::{CompressionMethod, EntryHeader};
