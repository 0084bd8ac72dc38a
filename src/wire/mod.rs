mod codec;
mod envelope;
mod message;
mod reader;
mod registry;

pub use codec::EnvelopeCodec;
pub use codec::WireError;
pub use envelope::DecodeError;
pub use envelope::Envelope;
pub use envelope::RunningMode;
pub use envelope::PROTOCOL_VERSION;
pub use message::Ballot;
pub use message::MessageKind;
pub use message::Proposal;
pub use message::QuorumMessage;
pub use message::Refuse;
pub use message::Sync;
pub use message::Vote;
pub use message::VoterState;
pub use registry::MessageRegistry;

pub(crate) use reader::{put_short_string, ByteReader};
