use crate::node::{ElectionStateChangeListener, ElectionStateSnapshot};
use std::net::SocketAddr;

/// An event that happened, as observed by the local node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    /// Election progress. Intermediate states are not queued: if several transitions happen
    /// between two calls to `next_event()`, only the latest is reported.
    Election(ElectionEvent),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElectionEvent {
    Searching,
    Following { leader_sid: u32, leader_addr: SocketAddr },
    Leading,
}

#[derive(Clone)]
pub struct NodeEventListener {
    election_state_change_listener: ElectionStateChangeListener,
}

impl NodeEventListener {
    pub(crate) fn new(election_state_change_listener: ElectionStateChangeListener) -> Self {
        NodeEventListener {
            election_state_change_listener,
        }
    }

    /// Waits for the next event. `None` once the node has shut down.
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.election_state_change_listener
            .next()
            .await
            .map(|election_state| NodeEvent::Election(ElectionEvent::from(election_state)))
    }

    pub fn current_election_state(&self) -> ElectionEvent {
        ElectionEvent::from(self.election_state_change_listener.current())
    }
}

impl From<ElectionStateSnapshot> for ElectionEvent {
    fn from(election_state: ElectionStateSnapshot) -> Self {
        match election_state {
            ElectionStateSnapshot::Searching => ElectionEvent::Searching,
            ElectionStateSnapshot::Following(leader) => ElectionEvent::Following {
                leader_sid: leader.sid.as_u32(),
                leader_addr: leader.client_addr,
            },
            ElectionStateSnapshot::Leading => ElectionEvent::Leading,
        }
    }
}
