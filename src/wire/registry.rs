use crate::wire::message::{MessageKind, Proposal, QuorumMessage, Refuse, Sync, Vote};
use crate::wire::reader::ByteReader;
use crate::wire::DecodeError;
use std::collections::HashMap;

type PayloadDecoder = for<'a> fn(&mut ByteReader<'a>) -> Result<QuorumMessage, DecodeError>;

/// MessageRegistry maps kind tags to payload decoders.
///
/// Build it once at startup with `MessageRegistry::build()` and hand it (usually behind an `Arc`)
/// to every codec that needs to decode envelopes. There is no global instance.
#[derive(Clone)]
pub struct MessageRegistry {
    decoders: HashMap<u8, PayloadDecoder>,
}

impl MessageRegistry {
    pub fn build() -> Self {
        let mut decoders: HashMap<u8, PayloadDecoder> = HashMap::with_capacity(MessageKind::ALL.len());
        for kind in MessageKind::ALL.iter() {
            decoders.insert(kind.tag(), Self::decoder_for(*kind));
        }

        MessageRegistry { decoders }
    }

    fn decoder_for(kind: MessageKind) -> PayloadDecoder {
        match kind {
            MessageKind::Vote => Vote::decode,
            MessageKind::Proposal => Proposal::decode,
            MessageKind::Refuse => Refuse::decode,
            MessageKind::Sync => Sync::decode,
        }
    }

    pub(crate) fn decode(&self, kind_tag: u8, reader: &mut ByteReader<'_>) -> Result<QuorumMessage, DecodeError> {
        match self.decoders.get(&kind_tag) {
            Some(decoder) => decoder(reader),
            None => Err(DecodeError::UnknownKind(kind_tag)),
        }
    }

    pub fn knows(&self, kind_tag: u8) -> bool {
        self.decoders.contains_key(&kind_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registers_every_kind() {
        let registry = MessageRegistry::build();
        for kind in MessageKind::ALL.iter() {
            assert!(registry.knows(kind.tag()), "{:?} missing", kind);
        }
        assert!(!registry.knows(0));
        assert!(!registry.knows(5));
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let registry = MessageRegistry::build();
        let mut reader = ByteReader::new(&[]);
        assert_eq!(Err(DecodeError::UnknownKind(42)), registry.decode(42, &mut reader));
    }
}
