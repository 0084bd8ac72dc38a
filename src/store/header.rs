use crate::node::{Epoch, Sid};
use crate::wire::{ByteReader, DecodeError, RunningMode};
use bytes::{BufMut, BytesMut};

pub const HEADER_SIZE: u64 = 64;

/// StoreHeader sits at the start of every segment and bounds its record area.
///
/// ```text
/// begin ts u64 | end ts u64 | begin offset u64 | end offset u64 | mbid u64 | epoch u64 |
/// max sid u32 | local sid u32 | component count u32 | produce mode u32
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreHeader {
    pub begin_timestamp: u64,
    pub end_timestamp: u64,
    /// Offset of the first record slot, right after this header.
    pub begin_offset: u64,
    /// One past the last record written to this segment. Equal to `begin_offset` when empty.
    pub end_offset: u64,
    pub mbid: u64,
    pub epoch: Epoch,
    pub max_sid: Sid,
    pub local_sid: Sid,
    pub component_count: u32,
    pub produce_mode: RunningMode,
}

impl StoreHeader {
    pub(crate) fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_u64(self.begin_timestamp);
        buf.put_u64(self.end_timestamp);
        buf.put_u64(self.begin_offset);
        buf.put_u64(self.end_offset);
        buf.put_u64(self.mbid);
        buf.put_u64(self.epoch.as_u64());
        buf.put_u32(self.max_sid.as_u32());
        buf.put_u32(self.local_sid.as_u32());
        buf.put_u32(self.component_count);
        buf.put_u32(self.produce_mode.as_u32());
        buf
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let header = StoreHeader {
            begin_timestamp: reader.u64()?,
            end_timestamp: reader.u64()?,
            begin_offset: reader.u64()?,
            end_offset: reader.u64()?,
            mbid: reader.u64()?,
            epoch: Epoch::new(reader.u64()?),
            max_sid: Sid::new(reader.u32()?),
            local_sid: Sid::new(reader.u32()?),
            component_count: reader.u32()?,
            produce_mode: RunningMode::from_u32(reader.u32()?)?,
        };
        reader.finish()?;
        Ok(header)
    }

    /// Check the header against the segment it was read from. Returns the violated rule.
    pub(crate) fn check(&self, segment_start: u64, segment_size: u64) -> Result<(), &'static str> {
        if self.begin_timestamp > self.end_timestamp {
            return Err("begin timestamp after end timestamp");
        }
        if self.begin_offset != segment_start + HEADER_SIZE {
            return Err("begin offset does not follow the header");
        }
        if self.begin_offset > self.end_offset {
            return Err("begin offset after end offset");
        }
        if self.end_offset > segment_start + segment_size {
            return Err("end offset beyond segment");
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin_offset == self.end_offset
    }
}

/// FNV-1a 64 of the cluster name. Every node of a cluster derives the same id.
pub fn cluster_mbid(cluster_name: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    cluster_name.as_bytes().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> StoreHeader {
        StoreHeader {
            begin_timestamp: 10,
            end_timestamp: 20,
            begin_offset: 1024 + HEADER_SIZE,
            end_offset: 1500,
            mbid: cluster_mbid("c1"),
            epoch: Epoch::new(3),
            max_sid: Sid::new(5),
            local_sid: Sid::new(2),
            component_count: 7,
            produce_mode: RunningMode::Cluster,
        }
    }

    #[test]
    fn fixed_width_layout() {
        let encoded = header().encode();
        assert_eq!(HEADER_SIZE as usize, encoded.len());
        assert_eq!(header(), StoreHeader::decode(&encoded).unwrap());
        // Epoch sits after five u64 fields.
        assert_eq!(&[0, 0, 0, 0, 0, 0, 0, 3], &encoded[40..48]);
    }

    #[test]
    fn check_rejects_inverted_ranges() {
        assert_eq!(Ok(()), header().check(1024, 1024));

        let mut h = header();
        h.begin_timestamp = 30;
        assert!(h.check(1024, 1024).is_err());

        let mut h = header();
        h.end_offset = h.begin_offset - 1;
        assert!(h.check(1024, 1024).is_err());

        let mut h = header();
        h.end_offset = 4096;
        assert!(h.check(1024, 1024).is_err());

        assert!(header().check(0, 1024).is_err());
    }

    #[test]
    fn mbid_is_fnv1a() {
        // Published FNV-1a 64 test vectors.
        assert_eq!(0xcbf2_9ce4_8422_2325, cluster_mbid(""));
        assert_eq!(0xaf63_dc4c_8601_ec8c, cluster_mbid("a"));
        assert_eq!(0x8594_4171_f739_67e8, cluster_mbid("foobar"));
    }
}
