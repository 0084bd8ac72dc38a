use crate::node::Sid;
use crate::wire::QuorumMessage;

/// Outbox hands messages to peers. Sending never blocks the actor and never fails loudly: a
/// message to an unreachable peer is dropped, and the protocol's retries cover the loss.
pub(crate) trait Outbox: Send {
    fn send(&self, to: Sid, message: QuorumMessage);
}
