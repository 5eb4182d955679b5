use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::storage::page::{page_constants::PAGE_SIZE, PageId};

/// Block-level access to the database file. Page `n` lives at byte
/// offset `n * PAGE_SIZE`; the file grows on demand when a page beyond
/// the current end is written.
pub struct DiskManager {
    db_io: File,
    file_name: PathBuf,

    num_writes: u32,
    num_flushes: u32,
}

impl DiskManager {
    pub fn new(db_file: impl AsRef<Path>) -> Result<Self> {
        let path = db_file.as_ref();
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open db file {}", path.display()))?;

        Ok(DiskManager {
            db_io,
            file_name: path.to_path_buf(),
            num_writes: 0,
            num_flushes: 0,
        })
    }

    pub fn write_page(&mut self, page_id: PageId, page_data: &[u8]) -> Result<()> {
        let offset = self.page_offset(page_id)?;

        self.db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("I/O error while seeking page {}", page_id))?;
        self.db_io
            .write_all(page_data)
            .with_context(|| format!("I/O error while writing page {}", page_id))?;
        self.db_io
            .flush()
            .with_context(|| format!("error flushing page {}", page_id))?;

        self.num_writes += 1;
        self.num_flushes += 1;
        Ok(())
    }

    pub fn read_page(&mut self, page_id: PageId, page_data: &mut [u8]) -> Result<()> {
        let offset = self.page_offset(page_id)?;

        let file_len = self
            .db_io
            .metadata()
            .with_context(|| format!("failed to stat db file {}", self.file_name.display()))?
            .len();

        // A page nobody has written yet reads as zeroes.
        if offset >= file_len {
            debug!("read of page {} past end of db file, zero-filling", page_id);
            page_data.fill(0);
            return Ok(());
        }

        self.db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("I/O error while seeking page {}", page_id))?;

        let available = ((file_len - offset) as usize).min(page_data.len());
        self.db_io
            .read_exact(&mut page_data[..available])
            .with_context(|| format!("I/O error while reading page {}", page_id))?;
        page_data[available..].fill(0);

        Ok(())
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes
    }

    pub fn num_flushes(&self) -> u32 {
        self.num_flushes
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    fn page_offset(&self, page_id: PageId) -> Result<u64> {
        if page_id < 0 {
            bail!("invalid page id {}", page_id);
        }
        Ok(page_id as u64 * PAGE_SIZE as u64)
    }
}
