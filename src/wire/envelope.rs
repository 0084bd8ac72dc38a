use crate::wire::message::QuorumMessage;
use crate::wire::reader::{put_short_string, ByteReader};
use crate::wire::MessageRegistry;
use bytes::{BufMut, Bytes, BytesMut};

/// Only protocol version this node speaks. Envelopes carrying anything else are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("Buffer truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Start offset {offset} is beyond buffer length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),
    #[error("Declared payload size {declared} does not match {available} bytes available")]
    PayloadSizeMismatch { declared: usize, available: usize },
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("Unknown message kind tag {0}")]
    UnknownKind(u8),
    #[error("Unknown running mode {0}")]
    UnknownRunningMode(u32),
    #[error("Unknown voter state {0}")]
    UnknownVoterState(u8),
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("Learner address is empty")]
    EmptyAddress,
    #[error("Learner sid {0} listed twice")]
    DuplicateLearner(u32),
}

/// RunningMode tells the receiver whether the sender thinks it is part of a replicated cluster.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RunningMode {
    Standalone,
    Cluster,
}

impl RunningMode {
    pub fn as_u32(&self) -> u32 {
        match self {
            RunningMode::Standalone => 1,
            RunningMode::Cluster => 2,
        }
    }

    pub fn from_u32(value: u32) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(RunningMode::Standalone),
            2 => Ok(RunningMode::Cluster),
            other => Err(DecodeError::UnknownRunningMode(other)),
        }
    }
}

/// Envelope is the transport frame around every quorum message.
///
/// Layout, big-endian:
///
/// ```text
/// version u32 | cluster name (u16 len + utf8) | running mode u32 | payload size u32 |
/// connection id u64 | kind tag u8 | payload
/// ```
///
/// The payload size is derived from the message on encode, so a constructed envelope can never
/// declare the wrong size.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub version: u32,
    pub cluster_name: String,
    pub running_mode: RunningMode,
    pub connection_id: u64,
    pub message: QuorumMessage,
}

impl Envelope {
    pub fn new<S: Into<String>>(
        cluster_name: S,
        running_mode: RunningMode,
        connection_id: u64,
        message: QuorumMessage,
    ) -> Self {
        Envelope {
            version: PROTOCOL_VERSION,
            cluster_name: cluster_name.into(),
            running_mode,
            connection_id,
            message,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::new();
        self.message.encode_payload(&mut payload);

        let mut buf = BytesMut::with_capacity(23 + self.cluster_name.len() + payload.len());
        buf.put_u32(self.version);
        put_short_string(&mut buf, &self.cluster_name);
        buf.put_u32(self.running_mode.as_u32());
        buf.put_u32(payload.len() as u32);
        buf.put_u64(self.connection_id);
        buf.put_u8(self.message.kind().tag());
        buf.put_slice(&payload);

        buf.freeze()
    }

    /// Decode an envelope that starts at `offset` within `bytes` and runs to the end of the
    /// slice. The input is only read.
    pub fn decode(registry: &MessageRegistry, bytes: &[u8], offset: usize) -> Result<Envelope, DecodeError> {
        if offset > bytes.len() {
            return Err(DecodeError::OffsetOutOfBounds {
                offset,
                len: bytes.len(),
            });
        }
        let mut reader = ByteReader::new(&bytes[offset..]);

        let version = reader.u32()?;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let cluster_name = reader.short_string("cluster name")?;
        let running_mode = RunningMode::from_u32(reader.u32()?)?;
        let declared = reader.u32()? as usize;
        let connection_id = reader.u64()?;
        let kind_tag = reader.u8()?;

        if declared != reader.remaining() {
            return Err(DecodeError::PayloadSizeMismatch {
                declared,
                available: reader.remaining(),
            });
        }

        let message = registry.decode(kind_tag, &mut reader)?;
        reader.finish()?;

        Ok(Envelope {
            version,
            cluster_name,
            running_mode,
            connection_id,
            message,
        })
    }
}
