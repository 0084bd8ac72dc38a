use crate::node::{Epoch, Sid};
use crate::store::byte_log::ByteLog;
use crate::store::header::{cluster_mbid, StoreHeader, HEADER_SIZE};
use crate::store::record::{ComponentRecord, RecordStatus, RECORD_FIXED_SIZE};
use crate::wire::{ByteReader, RunningMode};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("Segment {segment} header is corrupt: {reason}")]
    CorruptHeader { segment: u64, reason: String },
    #[error("Record at offset {offset} is corrupt: {reason}")]
    CorruptRecord { offset: u64, reason: String },
    #[error("Record offset {actual} does not match expected placement {expected}")]
    OffsetMismatch { expected: u64, actual: u64 },
    #[error("Record of {len} bytes does not fit in {capacity} bytes of segment record space")]
    RecordTooLarge { len: u64, capacity: u64 },
    #[error("Epoch {requested} is older than store epoch {current}")]
    StaleEpoch { current: Epoch, requested: Epoch },
    #[error("Segment belongs to cluster id {found:#x}, expected {expected:#x}")]
    ForeignCluster { expected: u64, found: u64 },
    #[error("Unknown key '{0}'")]
    UnknownKey(String),
    #[error("Key must not be empty")]
    EmptyKey,
    #[error("Counter for '{key}' would go backwards from {current} to {incoming}")]
    IncrRegression { key: String, current: u64, incoming: u64 },
    #[error("Segment size {0} leaves no room for records")]
    SegmentTooSmall(u64),
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub cluster_name: String,
    pub local_sid: Sid,
    pub max_sid: Sid,
    pub segment_size: u64,
    pub produce_mode: RunningMode,
}

/// Outcome of applying a replicated record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Applied {
    Appended,
    AlreadyApplied,
}

/// Where a log ends, qualified by the epoch of the leadership whose log it copies. Two logs at
/// the same epoch are prefixes of one another, so positions order by epoch and then offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LogPosition {
    pub epoch: Epoch,
    pub offset: u64,
}

impl LogPosition {
    pub fn new(epoch: Epoch, offset: u64) -> Self {
        LogPosition { epoch, offset }
    }
}

/// Encoded records read for replication.
#[derive(Clone, Debug)]
pub struct RecordBatch {
    pub data: Bytes,
    /// Where the next batch starts: one past the last record in `data`, or the requested start
    /// when nothing was read.
    pub next_offset: u64,
}

/// Store lays component records out over fixed-size segments of a ByteLog.
///
/// Offsets are global byte positions: segment `i` spans `[i * segment_size, (i + 1) * segment_size)`
/// and starts with a header. A record goes at the current end offset when it fits in the active
/// segment, otherwise at the first record slot of the next segment. Leader and followers run the
/// same placement rule, so a record's offset is the same on every node.
pub struct Store<L: ByteLog> {
    log: L,
    config: StoreConfig,
    mbid: u64,
    epoch: Epoch,
    active_segment: u64,
    active: StoreHeader,
    latest: HashMap<String, ComponentRecord>,
    num_records: u64,
}

/// Offset of the first record slot in an empty store. Followers that have nothing yet propose
/// this offset.
pub const INITIAL_OFFSET: u64 = HEADER_SIZE;

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl<L: ByteLog> Store<L> {
    /// Open a store over `log`, recovering any segments already in it.
    pub fn open(log: L, config: StoreConfig) -> Result<Self, StoreError> {
        if config.segment_size < HEADER_SIZE + RECORD_FIXED_SIZE {
            return Err(StoreError::SegmentTooSmall(config.segment_size));
        }

        let mbid = cluster_mbid(&config.cluster_name);
        let active = Self::fresh_header(&config, mbid, 0, Epoch::new(0));
        let mut store = Store {
            log,
            config,
            mbid,
            epoch: Epoch::new(0),
            active_segment: 0,
            active,
            latest: HashMap::new(),
            num_records: 0,
        };

        if store.log.is_empty() {
            store.write_active_header()?;
        } else {
            store.recover()?;
        }
        Ok(store)
    }

    fn fresh_header(config: &StoreConfig, mbid: u64, segment: u64, epoch: Epoch) -> StoreHeader {
        let now = now_millis();
        let begin_offset = segment * config.segment_size + HEADER_SIZE;
        StoreHeader {
            begin_timestamp: now,
            end_timestamp: now,
            begin_offset,
            end_offset: begin_offset,
            mbid,
            epoch,
            max_sid: config.max_sid,
            local_sid: config.local_sid,
            component_count: 0,
            produce_mode: config.produce_mode,
        }
    }

    fn recover(&mut self) -> Result<(), StoreError> {
        let segment_size = self.config.segment_size;
        let num_segments = (self.log.len() + segment_size - 1) / segment_size;

        for segment in 0..num_segments {
            let header = self.read_header(segment)?;
            if header.epoch < self.epoch {
                return Err(StoreError::CorruptHeader {
                    segment,
                    reason: format!("epoch {} regressed from {}", header.epoch, self.epoch),
                });
            }
            self.epoch = header.epoch;

            for record in self.read_segment_records(&header, header.begin_offset)? {
                self.num_records += 1;
                self.latest.insert(record.key.clone(), record);
            }

            self.active_segment = segment;
            self.active = header;
        }

        Ok(())
    }

    fn read_header(&self, segment: u64) -> Result<StoreHeader, StoreError> {
        let corrupt = |reason: String| StoreError::CorruptHeader { segment, reason };

        let segment_start = segment * self.config.segment_size;
        let raw = self
            .log
            .read_at(segment_start, HEADER_SIZE as usize)
            .map_err(|e| corrupt(e.to_string()))?;
        let header = StoreHeader::decode(&raw).map_err(|e| corrupt(e.to_string()))?;
        header
            .check(segment_start, self.config.segment_size)
            .map_err(|reason| corrupt(reason.to_string()))?;
        if header.mbid != self.mbid {
            return Err(StoreError::ForeignCluster {
                expected: self.mbid,
                found: header.mbid,
            });
        }

        Ok(header)
    }

    /// Records of one segment from `from` to the segment's end offset. `from` must be a record
    /// boundary.
    fn read_segment_records(&self, header: &StoreHeader, from: u64) -> Result<Vec<ComponentRecord>, StoreError> {
        if from >= header.end_offset {
            return Ok(Vec::new());
        }

        let raw = self.log.read_at(from, (header.end_offset - from) as usize)?;
        let mut reader = ByteReader::new(&raw);
        let mut records = Vec::new();
        let mut expected_offset = from;
        while !reader.is_empty() {
            let record = ComponentRecord::decode(&mut reader).map_err(|e| StoreError::CorruptRecord {
                offset: expected_offset,
                reason: e.to_string(),
            })?;
            if record.physical_offset != expected_offset {
                return Err(StoreError::CorruptRecord {
                    offset: expected_offset,
                    reason: format!("record claims offset {}", record.physical_offset),
                });
            }
            expected_offset += record.encoded_len();
            records.push(record);
        }

        Ok(records)
    }

    fn write_active_header(&mut self) -> Result<(), io::Error> {
        let segment_start = self.active_segment * self.config.segment_size;
        self.log.write_at(segment_start, &self.active.encode())
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn mbid(&self) -> u64 {
        self.mbid
    }

    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.epoch, self.end_offset())
    }

    /// One past the last record. `INITIAL_OFFSET` for an empty store.
    pub fn end_offset(&self) -> u64 {
        self.active.end_offset
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn active_header(&self) -> &StoreHeader {
        &self.active
    }

    /// Latest live record for `key`. Tombstoned keys yield None.
    pub fn get(&self, key: &str) -> Option<&ComponentRecord> {
        self.latest
            .get(key)
            .filter(|record| record.status == RecordStatus::Active)
    }

    /// Stamp the active segment with a new leadership epoch. Epochs never go backwards.
    pub fn begin_epoch(&mut self, epoch: Epoch) -> Result<(), StoreError> {
        if epoch < self.epoch {
            return Err(StoreError::StaleEpoch {
                current: self.epoch,
                requested: epoch,
            });
        }
        if epoch == self.epoch {
            return Ok(());
        }

        self.epoch = epoch;
        self.active.epoch = epoch;
        self.write_active_header()?;
        Ok(())
    }

    /// Where a record of `len` bytes would go next.
    fn placement(&self, len: u64) -> Result<u64, StoreError> {
        let capacity = self.config.segment_size - HEADER_SIZE;
        if len > capacity {
            return Err(StoreError::RecordTooLarge { len, capacity });
        }

        let segment_end = (self.active_segment + 1) * self.config.segment_size;
        if self.active.end_offset + len <= segment_end {
            Ok(self.active.end_offset)
        } else {
            Ok(segment_end + HEADER_SIZE)
        }
    }

    /// Leader path: bump the counter for `key` and persist the rendered `value`.
    pub fn increment(&mut self, key: &str, value: &str) -> Result<ComponentRecord, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let now = now_millis();
        let (incr, create_timestamp) = match self.latest.get(key) {
            Some(prev) if prev.status == RecordStatus::Active => (prev.incr + 1, prev.create_timestamp),
            Some(prev) => (prev.incr + 1, now),
            None => (1, now),
        };

        let mut record = ComponentRecord {
            create_timestamp,
            update_timestamp: now,
            physical_offset: 0,
            incr,
            status: RecordStatus::Active,
            key: key.to_string(),
            value: value.to_string(),
        };
        record.physical_offset = self.placement(record.encoded_len())?;
        self.append(record.clone())?;
        Ok(record)
    }

    /// Leader path: tombstone `key`. Its counter is kept so a later increment continues from it.
    pub fn remove(&mut self, key: &str) -> Result<ComponentRecord, StoreError> {
        let prev = match self.get(key) {
            Some(prev) => prev.clone(),
            None => return Err(StoreError::UnknownKey(key.to_string())),
        };

        let mut record = ComponentRecord {
            update_timestamp: now_millis(),
            status: RecordStatus::Deleted,
            ..prev
        };
        record.physical_offset = self.placement(record.encoded_len())?;
        self.append(record.clone())?;
        Ok(record)
    }

    /// Follower path: apply one record received from the leader. Records below the end offset
    /// were applied before and are skipped.
    pub fn apply(&mut self, record: ComponentRecord) -> Result<Applied, StoreError> {
        if record.physical_offset < self.active.end_offset {
            return Ok(Applied::AlreadyApplied);
        }

        let expected = self.placement(record.encoded_len())?;
        if record.physical_offset != expected {
            return Err(StoreError::OffsetMismatch {
                expected,
                actual: record.physical_offset,
            });
        }
        if let Some(prev) = self.latest.get(&record.key) {
            if record.incr < prev.incr {
                return Err(StoreError::IncrRegression {
                    key: record.key,
                    current: prev.incr,
                    incoming: record.incr,
                });
            }
        }

        self.append(record)?;
        Ok(Applied::Appended)
    }

    fn append(&mut self, record: ComponentRecord) -> Result<(), StoreError> {
        let segment_end = (self.active_segment + 1) * self.config.segment_size;
        if record.physical_offset >= segment_end {
            self.active_segment += 1;
            self.active = Self::fresh_header(&self.config, self.mbid, self.active_segment, self.epoch);
        }

        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        self.log.write_at(record.physical_offset, &buf)?;

        self.active.end_offset = record.physical_offset + record.encoded_len();
        self.active.end_timestamp = self.active.end_timestamp.max(record.update_timestamp);
        self.active.component_count += 1;
        self.write_active_header()?;

        self.num_records += 1;
        self.latest.insert(record.key.clone(), record);
        Ok(())
    }

    /// Encoded records with offsets in `[from, to)`, stopping once at least `max_bytes` have
    /// been collected. `from` must be a record boundary or a segment's end offset.
    pub fn read_range(&self, from: u64, to: u64, max_bytes: usize) -> Result<RecordBatch, StoreError> {
        let to = to.min(self.end_offset());
        let segment_size = self.config.segment_size;
        let mut out = BytesMut::new();
        let mut pos = from;
        let mut next_offset = from;

        'segments: while pos < to && out.len() < max_bytes {
            let segment = pos / segment_size;
            if segment > self.active_segment {
                break;
            }
            let header = if segment == self.active_segment {
                self.active.clone()
            } else {
                self.read_header(segment)?
            };
            if pos < header.begin_offset {
                pos = header.begin_offset;
                continue;
            }

            for record in self.read_segment_records(&header, pos)? {
                if record.physical_offset >= to || out.len() >= max_bytes {
                    break 'segments;
                }
                record.encode(&mut out);
                next_offset = record.physical_offset + record.encoded_len();
            }
            pos = (segment + 1) * segment_size;
        }

        Ok(RecordBatch {
            data: out.freeze(),
            next_offset,
        })
    }

    /// Drop everything and start a new, empty log stamped with `epoch`. Used when the local log
    /// can no longer be reconciled with the one it should copy.
    pub fn reset(&mut self, epoch: Epoch) -> Result<(), StoreError> {
        self.log.truncate(0)?;
        self.latest.clear();
        self.num_records = 0;
        self.epoch = epoch;
        self.active_segment = 0;
        self.active = Self::fresh_header(&self.config, self.mbid, 0, epoch);
        self.write_active_header()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_log(self) -> L {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryByteLog;

    fn config(segment_size: u64) -> StoreConfig {
        StoreConfig {
            cluster_name: "c1".to_string(),
            local_sid: Sid::new(1),
            max_sid: Sid::new(3),
            segment_size,
            produce_mode: RunningMode::Cluster,
        }
    }

    fn store(segment_size: u64) -> Store<InMemoryByteLog> {
        Store::open(InMemoryByteLog::new(), config(segment_size)).unwrap()
    }

    fn replicate(leader: &Store<InMemoryByteLog>, follower: &mut Store<InMemoryByteLog>) -> usize {
        let batch = leader
            .read_range(follower.end_offset(), leader.end_offset(), usize::MAX)
            .unwrap();
        assert_eq!(leader.end_offset(), batch.next_offset);
        let records = ComponentRecord::decode_all(&batch.data).unwrap();
        let n = records.len();
        for record in records {
            assert_eq!(Applied::Appended, follower.apply(record).unwrap());
        }
        n
    }

    #[test]
    fn increments_are_serial_per_key() {
        let mut store = store(4096);
        assert_eq!(INITIAL_OFFSET, store.end_offset());

        let first = store.increment("order", "ORD-1").unwrap();
        let second = store.increment("order", "ORD-2").unwrap();
        let other = store.increment("user", "U-1").unwrap();

        assert_eq!(1, first.incr);
        assert_eq!(2, second.incr);
        assert_eq!(1, other.incr);
        assert_eq!(INITIAL_OFFSET, first.physical_offset);
        assert_eq!(first.physical_offset + first.encoded_len(), second.physical_offset);
        assert_eq!(first.create_timestamp, second.create_timestamp);
        assert_eq!(3, store.active_header().component_count);
        assert!(matches!(store.increment("", "v"), Err(StoreError::EmptyKey)));
    }

    #[test]
    fn remove_tombstones_and_keeps_counter() {
        let mut store = store(4096);
        store.increment("k", "v1").unwrap();
        store.increment("k", "v2").unwrap();

        let tombstone = store.remove("k").unwrap();
        assert_eq!(RecordStatus::Deleted, tombstone.status);
        assert_eq!(2, tombstone.incr);
        assert!(store.get("k").is_none());
        assert!(matches!(store.remove("k"), Err(StoreError::UnknownKey(_))));

        assert_eq!(3, store.increment("k", "v3").unwrap().incr);
    }

    #[test]
    fn records_roll_to_next_segment() {
        // 64 byte header leaves 128 bytes; each record below is 44 + 1 + 20 = 65 bytes.
        let mut store = store(192);
        let value = "x".repeat(20);

        let a = store.increment("a", &value).unwrap();
        let b = store.increment("b", &value).unwrap();
        assert_eq!(64, a.physical_offset);
        assert_eq!(192 + 64, b.physical_offset);
        assert_eq!(Sid::new(1), store.active_header().local_sid);
        assert_eq!(192 + 64 + 65, store.end_offset());

        let too_big = "y".repeat(200);
        assert!(matches!(
            store.increment("c", &too_big),
            Err(StoreError::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn apply_is_offset_idempotent() {
        let mut leader = store(192);
        let mut follower = store(192);
        for i in 0..5 {
            leader.increment("k", &format!("v{}", i)).unwrap();
        }

        let batch = leader.read_range(INITIAL_OFFSET, leader.end_offset(), usize::MAX).unwrap();
        let records = ComponentRecord::decode_all(&batch.data).unwrap();
        assert_eq!(5, records.len());

        for record in records.iter().cloned() {
            assert_eq!(Applied::Appended, follower.apply(record).unwrap());
        }
        let end_after_first = follower.end_offset();
        let count_after_first = follower.num_records();

        for record in records {
            assert_eq!(Applied::AlreadyApplied, follower.apply(record).unwrap());
        }
        assert_eq!(end_after_first, follower.end_offset());
        assert_eq!(count_after_first, follower.num_records());
        assert_eq!(leader.end_offset(), follower.end_offset());
        assert_eq!(leader.get("k"), follower.get("k"));
    }

    #[test]
    fn apply_rejects_gaps() {
        let mut leader = store(4096);
        let mut follower = store(4096);
        leader.increment("a", "1").unwrap();
        let second = leader.increment("a", "2").unwrap();

        match follower.apply(second) {
            Err(StoreError::OffsetMismatch { expected, .. }) => assert_eq!(INITIAL_OFFSET, expected),
            other => panic!("Unexpected: {:?}", other),
        }
    }

    #[test]
    fn read_range_batches_and_resumes() {
        let mut leader = store(256);
        let mut follower = store(256);
        for i in 0..10 {
            leader.increment(&format!("k{}", i), "value").unwrap();
        }

        // One record per batch.
        let mut batches = 0;
        while follower.end_offset() < leader.end_offset() {
            let batch = leader.read_range(follower.end_offset(), leader.end_offset(), 1).unwrap();
            let records = ComponentRecord::decode_all(&batch.data).unwrap();
            assert_eq!(1, records.len());
            for record in records {
                follower.apply(record).unwrap();
            }
            assert_eq!(follower.end_offset(), batch.next_offset);
            batches += 1;
        }
        assert_eq!(10, batches);
        assert_eq!(10, follower.num_records());

        // Nothing left to send.
        let rest = leader
            .read_range(follower.end_offset(), leader.end_offset(), usize::MAX)
            .unwrap();
        assert!(rest.data.is_empty());
        assert_eq!(follower.end_offset(), rest.next_offset);
    }

    #[test]
    fn read_range_from_mid_record_is_corrupt() {
        let mut leader = store(4096);
        leader.increment("a", "1").unwrap();
        leader.increment("b", "2").unwrap();

        assert!(matches!(
            leader.read_range(INITIAL_OFFSET + 3, leader.end_offset(), usize::MAX),
            Err(StoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn epochs_never_go_backwards() {
        let mut store = store(4096);
        store.begin_epoch(Epoch::new(4)).unwrap();
        assert_eq!(Epoch::new(4), store.active_header().epoch);
        store.begin_epoch(Epoch::new(4)).unwrap();

        match store.begin_epoch(Epoch::new(3)) {
            Err(StoreError::StaleEpoch { current, requested }) => {
                assert_eq!(Epoch::new(4), current);
                assert_eq!(Epoch::new(3), requested);
            }
            other => panic!("Unexpected: {:?}", other),
        }
    }

    #[test]
    fn reopen_recovers_state() {
        let mut store = store(192);
        store.begin_epoch(Epoch::new(2)).unwrap();
        store.increment("a", &"x".repeat(20)).unwrap();
        store.increment("a", &"x".repeat(20)).unwrap();
        store.increment("b", "1").unwrap();
        let end = store.end_offset();

        let reopened = Store::open(store.into_log(), config(192)).unwrap();
        assert_eq!(end, reopened.end_offset());
        assert_eq!(Epoch::new(2), reopened.epoch());
        assert_eq!(3, reopened.num_records());
        assert_eq!(2, reopened.get("a").unwrap().incr);
    }

    fn log_with_one_record() -> InMemoryByteLog {
        let mut store = store(4096);
        store.increment("a", "1").unwrap();
        store.into_log()
    }

    #[test]
    fn reopen_rejects_foreign_cluster() {
        let mut other_cluster = config(4096);
        other_cluster.cluster_name = "c2".to_string();

        assert!(matches!(
            Store::open(log_with_one_record(), other_cluster),
            Err(StoreError::ForeignCluster { .. })
        ));
    }

    #[test]
    fn reopen_rejects_corrupt_header() {
        let mut log = log_with_one_record();
        // Clobber the begin offset field.
        log.write_at(16, &[0xFF]).unwrap();

        assert!(matches!(
            Store::open(log, config(4096)),
            Err(StoreError::CorruptHeader { segment: 0, .. })
        ));
    }

    #[test]
    fn reset_starts_a_new_log() {
        let mut leader = store(4096);
        let mut follower = store(4096);
        leader.begin_epoch(Epoch::new(3)).unwrap();
        leader.increment("a", "1").unwrap();
        follower.begin_epoch(Epoch::new(7)).unwrap();
        follower.increment("stray", "x").unwrap();

        // The new log may carry an older stamp than the one it replaces.
        follower.reset(Epoch::new(3)).unwrap();
        assert_eq!(LogPosition::new(Epoch::new(3), INITIAL_OFFSET), follower.position());
        assert!(follower.get("stray").is_none());

        assert_eq!(1, replicate(&leader, &mut follower));
        assert_eq!(leader.get("a"), follower.get("a"));
        assert_eq!(leader.position(), follower.position());
    }

    #[test]
    fn positions_order_by_epoch_then_offset() {
        let position = |epoch, offset| LogPosition::new(Epoch::new(epoch), offset);

        assert!(position(2, INITIAL_OFFSET) > position(1, 10_000));
        assert!(position(2, 200) > position(2, 100));
        assert_eq!(position(2, 100), position(2, 100));
    }
}
