use crate::node::Sid;
use std::fmt;

/// Epoch is a monotonically increasing term counter. A higher epoch always supersedes a lower one.
#[derive(Copy, Clone, Default, Hash, PartialOrd, PartialEq, Ord, Eq)]
pub struct Epoch(u64);

impl Epoch {
    pub const fn new(epoch: u64) -> Self {
        Epoch(epoch)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PersistentLocalState is used whenever the election protocol requires that something is persisted
/// to a durable store to guarantee safety.
///
/// Store methods behave like CAS operations: they return true if we have mutated state.
pub(crate) trait PersistentLocalState: Send {
    /// Election epoch (the logical clock) of the current or most recent election round.
    fn election_epoch(&self) -> Epoch;

    /// Set election epoch to `new_epoch` iff it is larger than the current election epoch.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_election_epoch_if_increased(&mut self, new_epoch: Epoch) -> bool;

    /// Return the new election epoch. Used when starting a new election round.
    fn increment_election_epoch(&mut self) -> Epoch;

    /// Epoch of the most recent leadership this node established, either as leader or follower.
    /// This is the "peer epoch" we advertise in our ballots.
    fn accepted_epoch(&self) -> Epoch;

    /// CAS: Return true if we successfully mutated state.
    fn store_accepted_epoch_if_increased(&mut self, new_epoch: Epoch) -> bool;

    /// Commit to `leader` at `epoch`. A node takes part in at most one leadership per epoch, so
    /// this only succeeds for an epoch above the accepted one, or to repeat an earlier commitment
    /// to the same leader.
    ///
    /// CAS: Return true if we are now committed to `leader` at `epoch`.
    fn accept_leader(&mut self, epoch: Epoch, leader: Sid) -> bool;
}

// Not durable. On restart the accepted epoch is recovered from the store's segment headers, and
// the election epoch catches up from peers' votes.
// TODO:3 Persist the election epoch so a restarted node never reuses a round it already voted in.
pub(crate) struct VolatileLocalState {
    election_epoch: Epoch,
    accepted_epoch: Epoch,
    // None when the accepted epoch was recovered rather than accepted in this process.
    accepted_leader: Option<Sid>,
}

impl VolatileLocalState {
    pub(crate) fn new() -> Self {
        VolatileLocalState {
            election_epoch: Epoch::new(0),
            accepted_epoch: Epoch::new(0),
            accepted_leader: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_epochs(election_epoch: Epoch, accepted_epoch: Epoch) -> Self {
        VolatileLocalState {
            election_epoch,
            accepted_epoch,
            accepted_leader: None,
        }
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn election_epoch(&self) -> Epoch {
        self.election_epoch
    }

    fn store_election_epoch_if_increased(&mut self, new_epoch: Epoch) -> bool {
        if new_epoch <= self.election_epoch {
            false
        } else {
            self.election_epoch = new_epoch;
            true
        }
    }

    fn increment_election_epoch(&mut self) -> Epoch {
        self.election_epoch.incr();
        self.election_epoch
    }

    fn accepted_epoch(&self) -> Epoch {
        self.accepted_epoch
    }

    fn store_accepted_epoch_if_increased(&mut self, new_epoch: Epoch) -> bool {
        if new_epoch <= self.accepted_epoch {
            false
        } else {
            self.accepted_epoch = new_epoch;
            self.accepted_leader = None;
            true
        }
    }

    fn accept_leader(&mut self, epoch: Epoch, leader: Sid) -> bool {
        if epoch > self.accepted_epoch {
            self.accepted_epoch = epoch;
            self.accepted_leader = Some(leader);
            true
        } else {
            epoch == self.accepted_epoch && self.accepted_leader == Some(leader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epochs_only_ratchet_forward() {
        let mut state = VolatileLocalState::new();

        assert_eq!(Epoch::new(1), state.increment_election_epoch());
        assert!(state.store_election_epoch_if_increased(Epoch::new(5)));
        assert!(!state.store_election_epoch_if_increased(Epoch::new(5)));
        assert!(!state.store_election_epoch_if_increased(Epoch::new(3)));
        assert_eq!(Epoch::new(5), state.election_epoch());
        assert_eq!(Epoch::new(6), state.increment_election_epoch());

        assert!(state.store_accepted_epoch_if_increased(Epoch::new(6)));
        assert!(!state.store_accepted_epoch_if_increased(Epoch::new(2)));
        assert_eq!(Epoch::new(6), state.accepted_epoch());
    }

    #[test]
    fn one_leader_per_accepted_epoch() {
        let mut state = VolatileLocalState::with_epochs(Epoch::new(1), Epoch::new(1));

        // Recovered epochs carry no leader, so nobody can claim them.
        assert!(!state.accept_leader(Epoch::new(1), Sid::new(2)));

        assert!(state.accept_leader(Epoch::new(2), Sid::new(4)));
        assert!(state.accept_leader(Epoch::new(2), Sid::new(4)));
        assert!(!state.accept_leader(Epoch::new(2), Sid::new(5)));
        assert!(!state.accept_leader(Epoch::new(1), Sid::new(4)));
        assert_eq!(Epoch::new(2), state.accepted_epoch());

        assert!(state.accept_leader(Epoch::new(3), Sid::new(5)));
        assert_eq!(Epoch::new(3), state.accepted_epoch());
    }
}
