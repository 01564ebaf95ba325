use async_trait::async_trait;
use std::fs::File;
use std::path::Path;

use super::Tokenizer;
use crate::error::{Error, Result};

/// Tokenizer over a local file, with random access via positional reads.
pub struct FileTokenizer {
    file: File,
    size: u64,
    position: u64,
}

impl FileTokenizer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(File::open(path)?)
    }

    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            size,
            position: 0,
        })
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }

    /// Fill `buf` starting at `offset`, stopping early only at end of file.
    fn fill_at(&self, offset: u64, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if !may_be_less && filled < buf.len() {
            return Err(Error::UnexpectedEndOfStream);
        }
        Ok(filled)
    }
}

#[async_trait]
impl Tokenizer for FileTokenizer {
    async fn peek(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        self.fill_at(self.position, buf, may_be_less)
    }

    async fn read(&mut self, buf: &mut [u8], may_be_less: bool) -> Result<usize> {
        let n = self.fill_at(self.position, buf, may_be_less)?;
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
        Some(self.size)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }
}
