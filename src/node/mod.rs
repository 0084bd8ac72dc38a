//! Quorum peer: election, replication and the links between members.
mod election;
mod local_state;
mod node_api;
mod outbox;
mod peer_link;
mod peers;
mod quorum_peer;
mod replication;

pub use election::{ElectionStateSnapshot, LeaderInfo};
pub use local_state::Epoch;
pub use node_api::IncrementError;
pub use peers::{InvalidClusterError, Sid};

pub(crate) use election::{ElectionConfig, ElectionStateChangeListener, TimerTick};
pub(crate) use local_state::{PersistentLocalState, VolatileLocalState};
pub(crate) use node_api::{IncrementInput, RemoveInput, WriteOutput};
pub(crate) use peer_link::PeerLinks;
pub(crate) use peers::{ClusterTracker, MemberMetadata};
pub(crate) use quorum_peer::{QuorumPeer, QuorumPeerConfig};
