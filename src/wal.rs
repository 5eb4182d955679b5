use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

use anyhow::{Context, Result};
use bytes::BufMut;

pub type Lsn = u64;

/// Append-only write-ahead log.
///
/// Records are staged in memory and pushed to stable storage by
/// `flush`. The buffer pool only drives the flush barrier ahead of
/// dirty write-backs; building and replaying records belongs to the
/// recovery layer above.
pub struct LogManager {
    log_io: File,
    log_buffer: Vec<u8>,

    next_lsn: Lsn,
    // Every lsn below this one is on stable storage.
    persistent_lsn: Lsn,
}

impl LogManager {
    pub fn new(log_file: impl AsRef<Path>) -> Result<Self> {
        let path = log_file.as_ref();
        let log_io = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        Ok(LogManager {
            log_io,
            log_buffer: Vec::new(),
            next_lsn: 0,
            persistent_lsn: 0,
        })
    }

    /// Stages a record and hands back its sequence number. Records are
    /// framed with a length prefix so the recovery layer can walk the
    /// log without knowing record internals.
    pub fn append_record(&mut self, record: &[u8]) -> Lsn {
        let lsn = self.next_lsn;
        self.next_lsn += 1;

        self.log_buffer.put_u32(record.len() as u32);
        self.log_buffer.put_slice(record);
        lsn
    }

    /// Forces every staged record to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        if !self.log_buffer.is_empty() {
            self.log_io
                .write_all(&self.log_buffer)
                .context("failed to write log buffer")?;
            self.log_buffer.clear();
        }
        self.log_io.flush().context("failed to flush log file")?;
        self.persistent_lsn = self.next_lsn;
        Ok(())
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn
    }
}
