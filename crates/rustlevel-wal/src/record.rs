// WAL record format and encoding/decoding
//
// Record format (binary):
// [length: u32 LE] [type: u8] [payload bytes] [crc32: u32 LE]
//
// One record carries one committed write batch, so a batch is either fully
// present in the log or not at all.

use crc32fast::Hasher;
use rustlevel_core::{Error, Operation, Result, WriteBatch};
use serde::{Deserialize, Serialize};

/// Frame overhead: length + type + crc
pub const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// Upper bound on a single record's content, used to reject garbage lengths
pub const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

/// WAL record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    /// An atomically committed batch of puts and deletes
    Batch = 1,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordType::Batch),
            _ => Err(Error::Corruption(format!(
                "Unknown WAL record type: {}",
                value
            ))),
        }
    }
}

/// A WAL record: the operations of one batch and the sequence number it
/// was committed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    pub sequence: u64,
    pub ops: Vec<Operation>,
}

impl WalRecord {
    /// Create a record for `batch` committed at `sequence`
    pub fn batch(sequence: u64, batch: &WriteBatch) -> Self {
        Self {
            sequence,
            ops: batch.operations().to_vec(),
        }
    }

    /// The record type tag written in the frame
    pub fn record_type(&self) -> RecordType {
        RecordType::Batch
    }

    /// Encode record to bytes with framing and CRC
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_bytes = bincode::serialize(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize record: {}", e)))?;

        let type_byte = self.record_type() as u8;
        let content_len = 1 + payload_bytes.len();
        if content_len > MAX_RECORD_SIZE {
            return Err(Error::InvalidArgument(format!(
                "Batch too large for a single log record: {} bytes",
                content_len
            )));
        }

        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(&payload_bytes);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload_bytes.len());
        frame.extend_from_slice(&(content_len as u32).to_le_bytes());
        frame.push(type_byte);
        frame.extend_from_slice(&payload_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());

        Ok(frame)
    }

    /// Decode record from bytes with validation.
    ///
    /// Returns the record and the number of bytes consumed. A short buffer is
    /// reported as [`Error::Corruption`] just like a checksum mismatch.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < FRAME_OVERHEAD {
            return Err(Error::Corruption("Incomplete record frame".to_string()));
        }

        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if length == 0 || length > MAX_RECORD_SIZE {
            return Err(Error::Corruption(format!(
                "Invalid record length: {}",
                length
            )));
        }

        let total_size = 4 + length + 4;
        if data.len() < total_size {
            return Err(Error::Corruption(format!(
                "Incomplete record: expected {} bytes, got {}",
                total_size,
                data.len()
            )));
        }

        let type_byte = data[4];
        let payload_bytes = &data[5..4 + length];

        let crc_offset = 4 + length;
        let expected_crc = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);

        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(payload_bytes);
        let actual_crc = hasher.finalize();

        if actual_crc != expected_crc {
            return Err(Error::Corruption(format!(
                "CRC mismatch: expected {}, got {}",
                expected_crc, actual_crc
            )));
        }

        RecordType::try_from(type_byte)?;

        let record: WalRecord = bincode::deserialize(payload_bytes)
            .map_err(|e| Error::Corruption(format!("Failed to deserialize record: {}", e)))?;

        Ok((record, total_size))
    }

    /// The batch this record replays
    pub fn to_batch(&self) -> WriteBatch {
        WriteBatch::from(self.ops.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WalRecord {
        let mut batch = WriteBatch::new();
        batch.put(b"foo", b"bar").delete(b"baz");
        WalRecord::batch(7, &batch)
    }

    #[test]
    fn test_record_type_conversion() {
        assert_eq!(RecordType::try_from(1).unwrap(), RecordType::Batch);
        assert!(RecordType::try_from(99).is_err());
    }

    #[test]
    fn test_batch_record_encode_decode() {
        let record = sample();

        let encoded = record.encode().unwrap();
        assert!(encoded.len() > FRAME_OVERHEAD);

        let (decoded, size) = WalRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(size, encoded.len());
        assert_eq!(decoded.to_batch().len(), 2);
    }

    #[test]
    fn test_crc_validation() {
        let mut encoded = sample().encode().unwrap();
        encoded[10] ^= 0xFF;

        let err = WalRecord::decode(&encoded).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_incomplete_record() {
        let encoded = sample().encode().unwrap();

        let err = WalRecord::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(err.is_corruption());
        assert!(WalRecord::decode(&encoded[..5]).is_err());
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let data = [0u8; 16];
        assert!(WalRecord::decode(&data).unwrap_err().is_corruption());
    }
}
