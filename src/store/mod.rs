//! Replicated record format: fixed-size segments, each a header followed by component records.
mod byte_log;
mod header;
mod record;
mod store;

pub use byte_log::ByteLog;
pub use byte_log::InMemoryByteLog;
pub use header::cluster_mbid;
pub use header::StoreHeader;
pub use header::HEADER_SIZE;
pub use record::ComponentRecord;
pub use record::RecordDecodeError;
pub use record::RecordStatus;
pub use record::RECORD_FIXED_SIZE;
pub use store::Applied;
pub use store::LogPosition;
pub use store::RecordBatch;
pub use store::Store;
pub use store::StoreConfig;
pub use store::StoreError;
pub use store::INITIAL_OFFSET;
