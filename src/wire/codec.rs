use crate::wire::{DecodeError, Envelope, MessageRegistry};
use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame a peer may send. A Sync carries at most one catch-up batch, which the leader
/// caps well below this.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Transport failure: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed envelope: {0}")]
    Decode(#[from] DecodeError),
}

/// EnvelopeCodec frames envelopes on a byte stream: a 4 byte big-endian length prefix followed by
/// exactly one encoded envelope.
pub struct EnvelopeCodec {
    frames: LengthDelimitedCodec,
    registry: Arc<MessageRegistry>,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<MessageRegistry>) -> Self {
        let frames = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();

        EnvelopeCodec { frames, registry }
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(Envelope::decode(&self.registry, &frame, 0)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = WireError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.frames.encode(item.encode(), dst)?;
        Ok(())
    }
}
