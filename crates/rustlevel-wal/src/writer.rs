// WAL writer module - handles appending records to the log
use crate::record::WalRecord;
use crate::segment::{segment_file_name, SegmentManager};
use rustlevel_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// The file behind the active segment
trait SegmentFile: Write + Send {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    fn sync_data(&mut self) -> io::Result<()>;
    fn sync_all(&mut self) -> io::Result<()>;
}

impl SegmentFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

fn open_segment(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

pub struct WalWriter {
    file: Box<dyn SegmentFile>,
    current_segment: PathBuf,
    current_size: u64,
    max_segment_size: u64,
    bytes_written: u64,
    wal_dir: PathBuf,
    /// Set when a failed append could not be rolled back. The segment may
    /// then end in a partial frame, so nothing more is appended to it.
    poisoned: bool,
}

impl WalWriter {
    /// Open the log for appending.
    ///
    /// Appends to the newest existing segment, or creates a segment starting at
    /// `next_sequence` when the directory holds none.
    pub fn open(wal_dir: &Path, max_segment_size: u64, next_sequence: u64) -> Result<Self> {
        let segments = SegmentManager::new(wal_dir.to_path_buf());
        segments.ensure_dir()?;

        let segment_path = match segments.latest_segment()? {
            Some(latest) => latest.path,
            None => wal_dir.join(segment_file_name(next_sequence)),
        };

        let file = open_segment(&segment_path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            file: Box::new(file),
            current_segment: segment_path,
            current_size,
            max_segment_size,
            bytes_written: 0,
            wal_dir: wal_dir.to_path_buf(),
            poisoned: false,
        })
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Precondition(format!(
                "WAL segment {} ends in a partial record; reopen to recover",
                self.current_segment.display()
            )));
        }
        Ok(())
    }

    /// Append one record. The frame always reaches the OS before returning;
    /// with `sync` it is also forced to stable storage.
    ///
    /// On failure the segment is cut back to its length before the call, so a
    /// rejected record never shows up on replay. If that cut fails too, the
    /// writer refuses further appends.
    ///
    /// Returns the number of bytes written.
    pub fn append(&mut self, record: &WalRecord, sync: bool) -> Result<u64> {
        self.ensure_usable()?;
        let encoded = record.encode()?;
        let record_size = encoded.len() as u64;

        if self.current_size > 0 && self.current_size + record_size > self.max_segment_size {
            self.rotate(record.sequence)?;
        }

        if let Err(e) = self.write_frame(&encoded, sync) {
            self.roll_back(record.sequence, &e);
            return Err(e.into());
        }
        self.current_size += record_size;
        self.bytes_written += record_size;

        Ok(record_size)
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn roll_back(&mut self, sequence: u64, cause: &io::Error) {
        match self.file.set_len(self.current_size) {
            Ok(()) => warn!(
                sequence,
                segment = ?self.current_segment,
                error = %cause,
                "WAL append failed, partial record removed"
            ),
            Err(e) => {
                self.poisoned = true;
                error!(
                    sequence,
                    segment = ?self.current_segment,
                    error = %cause,
                    truncate_error = %e,
                    "WAL append failed and could not be rolled back"
                );
            }
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Close the current segment and start a new one at `next_sequence`.
    pub fn rotate(&mut self, next_sequence: u64) -> Result<()> {
        self.ensure_usable()?;
        self.sync()?;

        let new_segment = self.wal_dir.join(segment_file_name(next_sequence));
        let file = open_segment(&new_segment)?;

        debug!(segment = ?new_segment, "Rotated WAL segment");

        self.current_size = file.metadata()?.len();
        self.file = Box::new(file);
        self.current_segment = new_segment;

        Ok(())
    }

    /// Get the current segment path
    pub fn current_segment_path(&self) -> &Path {
        &self.current_segment
    }

    /// Get the current segment size in bytes
    pub fn current_segment_size(&self) -> u64 {
        self.current_size
    }

    /// Bytes appended since this writer was opened
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        // Best effort sync on drop
        let _ = self.sync();
    }
}
