//! Checkpoint tables - sorted, block-checksummed images of the live key set
//!
//! A checkpoint table holds every live key/value pair as of one sequence
//! number. Once it is durable and recorded in the manifest, the log segments
//! it covers can be deleted.
//!
//! ## File Format
//!
//! ```text
//! +------------------+
//! | Data Blocks      |  <- Length-prefixed entries, CRC per block
//! +------------------+
//! | Index Block      |  <- First key + offset of every data block, CRC
//! +------------------+
//! | Footer           |  <- Magic, version, sequence, index location, CRC
//! +------------------+
//! | Footer length    |  <- u32 LE
//! +------------------+
//! ```

use rustlevel_core::format_version::{magic, table_version, TABLE_FORMAT_VERSION};
use rustlevel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A single key/value pair in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// The key
    pub key: Vec<u8>,
    /// The value
    pub value: Vec<u8>,
}

/// Index entry pointing to a data block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// First key in the block
    first_key: Vec<u8>,
    /// Offset of the block in the file
    offset: u64,
    /// Size of the block in bytes, including its CRC
    size: u32,
}

/// Table footer containing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFooter {
    magic: u32,
    version: u16,
    /// Sequence number the table was written at
    sequence: u64,
    index_offset: u64,
    index_size: u32,
    entry_count: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    /// CRC32 of the footer encoded with this field set to zero
    crc: u32,
}

impl TableFooter {
    fn checksum(&self) -> Result<u32> {
        let unsealed = TableFooter {
            crc: 0,
            ..self.clone()
        };
        let encoded = bincode::serialize(&unsealed)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(crc32fast::hash(&encoded))
    }
}

/// Table metadata (in-memory representation)
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// Path to the table file
    pub path: PathBuf,
    /// Sequence number the table reflects
    pub sequence: u64,
    /// Number of entries
    pub entry_count: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Minimum key
    pub min_key: Vec<u8>,
    /// Maximum key
    pub max_key: Vec<u8>,
}

/// File name for the table written at `sequence`
pub fn table_file_name(sequence: u64) -> String {
    format!("{:016x}.tbl", sequence)
}

/// Parse the sequence out of a table file name
pub fn parse_table_name(name: &str) -> Option<u64> {
    u64::from_str_radix(name.strip_suffix(".tbl")?, 16).ok()
}

/// Table writer - creates new table files
pub struct TableWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
    index: Vec<IndexEntry>,
    block_buffer: Vec<u8>,
    block_size: usize,
    current_block_first_key: Option<Vec<u8>>,
    entry_count: u64,
    sequence: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
}

impl TableWriter {
    /// Create a table file for the state at `sequence`
    pub fn create(path: impl AsRef<Path>, block_size: usize, sequence: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let block_size = block_size.max(64);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            position: 0,
            index: Vec::new(),
            block_buffer: Vec::with_capacity(block_size),
            block_size,
            current_block_first_key: None,
            entry_count: 0,
            sequence,
            min_key: None,
            max_key: None,
        })
    }

    /// Add an entry. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(Error::InvalidArgument(
                    "table keys must be added in ascending order".to_string(),
                ));
            }
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        if self.current_block_first_key.is_none() {
            self.current_block_first_key = Some(key.to_vec());
        }

        let entry = TableEntry {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let encoded =
            bincode::serialize(&entry).map_err(|e| Error::Serialization(e.to_string()))?;

        self.block_buffer
            .extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        self.block_buffer.extend_from_slice(&encoded);
        self.entry_count += 1;

        if self.block_buffer.len() >= self.block_size {
            self.flush_block()?;
        }

        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_buffer.is_empty() {
            return Ok(());
        }

        let crc = crc32fast::hash(&self.block_buffer);

        if let Some(first_key) = self.current_block_first_key.take() {
            self.index.push(IndexEntry {
                first_key,
                offset: self.position,
                size: self.block_buffer.len() as u32 + 4,
            });
        }

        self.writer.write_all(&self.block_buffer)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.position += self.block_buffer.len() as u64 + 4;

        self.block_buffer.clear();

        Ok(())
    }

    /// Write the index and footer and force the file to stable storage
    pub fn finish(mut self) -> Result<TableMeta> {
        self.flush_block()?;

        let index_offset = self.position;
        let index_encoded =
            bincode::serialize(&self.index).map_err(|e| Error::Serialization(e.to_string()))?;
        self.writer.write_all(&index_encoded)?;
        self.writer
            .write_all(&crc32fast::hash(&index_encoded).to_le_bytes())?;
        self.position += index_encoded.len() as u64 + 4;

        let min_key = self.min_key.take().unwrap_or_default();
        let max_key = self.max_key.take().unwrap_or_default();

        let mut footer = TableFooter {
            magic: magic::TABLE,
            version: TABLE_FORMAT_VERSION,
            sequence: self.sequence,
            index_offset,
            index_size: index_encoded.len() as u32,
            entry_count: self.entry_count,
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            crc: 0,
        };
        footer.crc = footer.checksum()?;

        let footer_encoded =
            bincode::serialize(&footer).map_err(|e| Error::Serialization(e.to_string()))?;
        self.writer.write_all(&footer_encoded)?;
        self.writer
            .write_all(&(footer_encoded.len() as u32).to_le_bytes())?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let file_size = self.position + footer_encoded.len() as u64 + 4;

        Ok(TableMeta {
            path: self.path,
            sequence: self.sequence,
            entry_count: self.entry_count,
            file_size,
            min_key,
            max_key,
        })
    }
}

/// Table reader - reads existing table files
pub struct TableReader {
    path: PathBuf,
    file: BufReader<File>,
    index: Vec<IndexEntry>,
    footer: TableFooter,
    file_size: u64,
}

impl TableReader {
    /// Open a table file, validating its footer and index
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < 4 {
            return Err(Error::Corruption(format!("{:?}: table too small", path)));
        }

        file.seek(SeekFrom::End(-4))?;
        let mut footer_len_buf = [0u8; 4];
        file.read_exact(&mut footer_len_buf)?;
        let footer_len = u32::from_le_bytes(footer_len_buf) as u64;
        if footer_len + 4 > file_size {
            return Err(Error::Corruption(format!("{:?}: bad footer length", path)));
        }

        file.seek(SeekFrom::Start(file_size - 4 - footer_len))?;
        let mut footer_buf = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_buf)?;

        let footer: TableFooter = bincode::deserialize(&footer_buf)
            .map_err(|e| Error::Corruption(format!("{:?}: unreadable footer: {}", path, e)))?;

        if footer.magic != magic::TABLE {
            return Err(Error::Corruption(format!("{:?}: invalid table magic", path)));
        }
        if !table_version().can_read(footer.version) {
            return Err(Error::Corruption(format!(
                "{:?}: unsupported table version {}",
                path, footer.version
            )));
        }
        if footer.checksum()? != footer.crc {
            return Err(Error::Corruption(format!("{:?}: footer CRC mismatch", path)));
        }

        let index_end = footer
            .index_offset
            .checked_add(u64::from(footer.index_size))
            .and_then(|end| end.checked_add(4));
        if index_end.map_or(true, |end| end > file_size - 4 - footer_len) {
            return Err(Error::Corruption(format!("{:?}: index out of bounds", path)));
        }

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_buf = vec![0u8; footer.index_size as usize];
        file.read_exact(&mut index_buf)?;
        let mut crc_buf = [0u8; 4];
        file.read_exact(&mut crc_buf)?;
        if crc32fast::hash(&index_buf) != u32::from_le_bytes(crc_buf) {
            return Err(Error::Corruption(format!("{:?}: index CRC mismatch", path)));
        }

        let index: Vec<IndexEntry> = bincode::deserialize(&index_buf)
            .map_err(|e| Error::Corruption(format!("{:?}: unreadable index: {}", path, e)))?;

        Ok(Self {
            path,
            file: BufReader::new(file),
            index,
            footer,
            file_size,
        })
    }

    /// Get a value by key
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let block_idx = self
            .index
            .partition_point(|entry| entry.first_key.as_slice() <= key);
        if block_idx == 0 {
            return Ok(None);
        }

        let block = self.read_block(block_idx - 1)?;
        Ok(block
            .into_iter()
            .find(|entry| entry.key.as_slice() == key)
            .map(|entry| entry.value))
    }

    /// Read a data block by index, verifying its CRC
    fn read_block(&mut self, block_idx: usize) -> Result<Vec<TableEntry>> {
        let index_entry = &self.index[block_idx];
        if index_entry.size < 4 {
            return Err(Error::Corruption("Block too small".into()));
        }

        self.file.seek(SeekFrom::Start(index_entry.offset))?;

        let mut data_buf = vec![0u8; index_entry.size as usize - 4];
        self.file.read_exact(&mut data_buf)?;

        let mut crc_buf = [0u8; 4];
        self.file.read_exact(&mut crc_buf)?;
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&data_buf) {
            return Err(Error::Corruption(format!(
                "{:?}: block {} CRC mismatch",
                self.path, block_idx
            )));
        }

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset + 4 <= data_buf.len() {
            let len = u32::from_le_bytes([
                data_buf[offset],
                data_buf[offset + 1],
                data_buf[offset + 2],
                data_buf[offset + 3],
            ]) as usize;
            offset += 4;

            if offset + len > data_buf.len() {
                return Err(Error::Corruption("Entry overruns block".into()));
            }

            let entry: TableEntry = bincode::deserialize(&data_buf[offset..offset + len])
                .map_err(|e| Error::Corruption(format!("Unreadable table entry: {}", e)))?;
            entries.push(entry);
            offset += len;
        }

        Ok(entries)
    }

    /// Read every entry in key order, failing on the first damaged block
    pub fn read_all(&mut self) -> Result<Vec<TableEntry>> {
        let mut entries = Vec::with_capacity(self.footer.entry_count as usize);
        for block_idx in 0..self.index.len() {
            entries.extend(self.read_block(block_idx)?);
        }
        Ok(entries)
    }

    /// Read every intact block, skipping damaged ones.
    ///
    /// Returns the entries recovered and the number of blocks skipped.
    pub fn salvage(&mut self) -> Result<(Vec<TableEntry>, usize)> {
        let mut entries = Vec::new();
        let mut damaged = 0;
        for block_idx in 0..self.index.len() {
            match self.read_block(block_idx) {
                Ok(block) => entries.extend(block),
                Err(e) if e.is_corruption() => damaged += 1,
                Err(e) => return Err(e),
            }
        }
        Ok((entries, damaged))
    }

    /// Get metadata about this table
    pub fn metadata(&self) -> TableMeta {
        TableMeta {
            path: self.path.clone(),
            sequence: self.footer.sequence,
            entry_count: self.footer.entry_count,
            file_size: self.file_size,
            min_key: self.footer.min_key.clone(),
            max_key: self.footer.max_key.clone(),
        }
    }
}
