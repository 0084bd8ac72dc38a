use crate::wire::{ByteReader, DecodeError};
use bytes::{BufMut, BytesMut};

/// Fixed part of a record: four u64 fields, the status, and the two length prefixes.
pub const RECORD_FIXED_SIZE: u64 = 8 * 4 + 4 + 4 + 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordStatus {
    Active,
    Deleted,
}

impl RecordStatus {
    fn as_u32(&self) -> u32 {
        match self {
            RecordStatus::Active => 1,
            RecordStatus::Deleted => 2,
        }
    }

    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(RecordStatus::Active),
            2 => Some(RecordStatus::Deleted),
            _ => None,
        }
    }
}

/// ComponentRecord is one replicated ID generator entry: the key, its last rendered value and
/// the counter that increment placeholders draw from.
///
/// ```text
/// create ts u64 | update ts u64 | physical offset u64 | incr u64 | status u32 |
/// key (u32 len + bytes) | value (u32 len + bytes)
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComponentRecord {
    pub create_timestamp: u64,
    pub update_timestamp: u64,
    pub physical_offset: u64,
    pub incr: u64,
    pub status: RecordStatus,
    pub key: String,
    pub value: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordDecodeError {
    #[error(transparent)]
    Layout(#[from] DecodeError),
    #[error("Unknown record status {0}")]
    UnknownStatus(u32),
}

impl ComponentRecord {
    pub fn encoded_len(&self) -> u64 {
        RECORD_FIXED_SIZE + self.key.len() as u64 + self.value.len() as u64
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len() as usize);
        buf.put_u64(self.create_timestamp);
        buf.put_u64(self.update_timestamp);
        buf.put_u64(self.physical_offset);
        buf.put_u64(self.incr);
        buf.put_u32(self.status.as_u32());
        buf.put_u32(self.key.len() as u32);
        buf.put_slice(self.key.as_bytes());
        buf.put_u32(self.value.len() as u32);
        buf.put_slice(self.value.as_bytes());
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self, RecordDecodeError> {
        let create_timestamp = reader.u64()?;
        let update_timestamp = reader.u64()?;
        let physical_offset = reader.u64()?;
        let incr = reader.u64()?;
        let raw_status = reader.u32()?;
        let status = RecordStatus::from_u32(raw_status).ok_or(RecordDecodeError::UnknownStatus(raw_status))?;
        let key = reader.long_string("record key")?;
        let value = reader.long_string("record value")?;

        Ok(ComponentRecord {
            create_timestamp,
            update_timestamp,
            physical_offset,
            incr,
            status,
            key,
            value,
        })
    }

    /// Decode every record in `bytes`, in order. Used on the follower side of a Sync.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<ComponentRecord>, RecordDecodeError> {
        let mut reader = ByteReader::new(bytes);
        let mut records = Vec::new();
        while !reader.is_empty() {
            records.push(Self::decode(&mut reader)?);
        }
        Ok(records)
    }
}
