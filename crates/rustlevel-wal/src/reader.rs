// WAL reader module - reads and replays log records
//
// The reader handles:
// 1. Segment discovery - finding all WAL segment files in order
// 2. Record reading - iterating through records in each segment
// 3. CRC validation - verifying data integrity of each record
//
// Any frame that cannot be decoded (short tail, bad length, checksum
// mismatch) is reported as Error::Corruption. The caller decides whether to
// stop, truncate, or skip the rest of the segment.

use crate::record::{WalRecord, MAX_RECORD_SIZE};
use crate::segment::SegmentManager;
use rustlevel_core::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// WAL reader for reading records from log segments
pub struct WalReader {
    /// Sorted list of segment file paths
    segments: Vec<PathBuf>,
    /// Index of current segment being read
    current_segment_index: usize,
    /// Buffered reader for current segment
    reader: Option<BufReader<File>>,
    /// End offset of the last intact record in the current segment
    valid_offset: u64,
}

impl WalReader {
    /// Create a new WAL reader for the given WAL directory
    pub fn new(wal_dir: &Path) -> Result<Self> {
        let segments = SegmentManager::new(wal_dir.to_path_buf())
            .list_segments()?
            .into_iter()
            .map(|s| s.path)
            .collect();

        let mut reader = Self {
            segments,
            current_segment_index: 0,
            reader: None,
            valid_offset: 0,
        };

        if !reader.segments.is_empty() {
            reader.open_segment(0)?;
        }

        Ok(reader)
    }

    fn open_segment(&mut self, index: usize) -> Result<()> {
        let file = File::open(&self.segments[index])?;

        self.reader = Some(BufReader::new(file));
        self.current_segment_index = index;
        self.valid_offset = 0;

        Ok(())
    }

    /// Move to the next segment, returning false when none remain
    fn advance_segment(&mut self) -> Result<bool> {
        let next_index = self.current_segment_index + 1;
        if next_index >= self.segments.len() {
            self.reader = None;
            return Ok(false);
        }

        self.open_segment(next_index)?;
        Ok(true)
    }

    /// Read the next record from the WAL
    ///
    /// Returns `Ok(Some(record))` if a record was read successfully,
    /// `Ok(None)` if we've reached the end of all segments,
    /// or an error if reading/parsing failed.
    pub fn next_record(&mut self) -> Result<Option<WalRecord>> {
        loop {
            let reader = match &mut self.reader {
                Some(r) => r,
                None => return Ok(None),
            };

            match Self::read_record(reader)? {
                Some((record, bytes_read)) => {
                    self.valid_offset += bytes_read as u64;
                    return Ok(Some(record));
                }
                None => {
                    if !self.advance_segment()? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Abandon the rest of the current segment and continue with the next.
    ///
    /// Returns false when there is no next segment.
    pub fn skip_segment(&mut self) -> Result<bool> {
        self.advance_segment()
    }

    /// Read a single record, returning it with the number of bytes consumed
    fn read_record(reader: &mut BufReader<File>) -> Result<Option<(WalRecord, usize)>> {
        let mut len_buf = [0u8; 4];
        match read_fully(reader, &mut len_buf)? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(Error::Corruption(format!(
                    "Truncated record header: {} of 4 bytes",
                    n
                )))
            }
        }

        let content_len = u32::from_le_bytes(len_buf) as usize;
        if content_len == 0 || content_len > MAX_RECORD_SIZE {
            return Err(Error::Corruption(format!(
                "Invalid record length: {} bytes",
                content_len
            )));
        }

        let mut frame = vec![0u8; 4 + content_len + 4];
        frame[..4].copy_from_slice(&len_buf);
        let read = read_fully(reader, &mut frame[4..])?;
        if read < content_len + 4 {
            return Err(Error::Corruption(format!(
                "Truncated record: {} of {} bytes",
                read,
                content_len + 4
            )));
        }

        let (record, bytes_consumed) = WalRecord::decode(&frame)?;
        Ok(Some((record, bytes_consumed)))
    }

    /// Get the number of segments discovered
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Path of the segment currently being read
    pub fn current_segment_path(&self) -> Option<&Path> {
        self.reader
            .as_ref()
            .map(|_| self.segments[self.current_segment_index].as_path())
    }

    /// End offset of the last intact record in the current segment
    pub fn valid_offset(&self) -> u64 {
        self.valid_offset
    }

    /// Read all remaining records into a vector
    pub fn read_all(&mut self) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Like `read_exact`, but reports how much was read instead of failing on EOF
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator implementation for WalReader
impl Iterator for WalReader {
    type Item = Result<WalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
