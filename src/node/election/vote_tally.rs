use crate::node::{Epoch, Sid};
use crate::wire::{Ballot, Vote, VoterState};
use std::collections::HashMap;

/// VoteTally holds what a Searching node has heard during the current round.
///
/// `received` only holds votes cast at the node's current election epoch and is what regular
/// quorum is counted over. `out_of_election` holds the latest vote of every sender that reported
/// itself as Following or Leading, regardless of epoch, and is how a late joiner finds a leader
/// that was elected without it.
#[derive(Debug, Default)]
pub(crate) struct VoteTally {
    received: HashMap<Sid, Vote>,
    out_of_election: HashMap<Sid, Vote>,
}

impl VoteTally {
    pub(crate) fn record_received(&mut self, vote: Vote) {
        self.received.insert(vote.sid, vote);
    }

    pub(crate) fn record_out_of_election(&mut self, vote: Vote) {
        self.out_of_election.insert(vote.sid, vote);
    }

    /// Called when the clock moves to a new epoch: old-epoch votes no longer count.
    pub(crate) fn clear_received(&mut self) {
        self.received.clear();
    }

    pub(crate) fn num_received(&self) -> usize {
        self.received.len()
    }

    pub(crate) fn count_matching(&self, ballot: Ballot) -> usize {
        self.received.values().filter(|vote| vote.ballot() == ballot).count()
    }

    /// The leader vote that `quorum` established senders agree on, if any.
    ///
    /// Senders agree when they name the same leader at the same election epoch. The leader's own
    /// vote must be among them and must say Leading, otherwise a quorum of followers of a dead
    /// leader would pull us into following it.
    pub(crate) fn established_leader(&self, quorum: usize) -> Option<Vote> {
        let mut supporters: HashMap<(Sid, Epoch), usize> = HashMap::new();
        for vote in self.out_of_election.values() {
            *supporters.entry((vote.leader, vote.election_epoch)).or_insert(0) += 1;
        }

        supporters
            .into_iter()
            .filter(|(_, count)| *count >= quorum)
            .filter_map(|((leader, epoch), _)| {
                self.out_of_election
                    .get(&leader)
                    .filter(|vote| vote.state == VoterState::Leading && vote.leader == leader)
                    .filter(|vote| vote.election_epoch == epoch)
                    .copied()
            })
            .max_by_key(|vote| vote.ballot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(sid: u32, epoch: u64, leader: u32, state: VoterState) -> Vote {
        let ballot = Ballot {
            election_epoch: Epoch::new(epoch),
            peer_epoch: Epoch::new(epoch),
            leader: Sid::new(leader),
        };
        Vote::new(Sid::new(sid), ballot, state)
    }

    #[test]
    fn counts_only_identical_ballots() {
        let mut tally = VoteTally::default();
        tally.record_received(vote(1, 5, 1, VoterState::Searching));
        tally.record_received(vote(2, 5, 1, VoterState::Searching));
        tally.record_received(vote(3, 5, 3, VoterState::Searching));

        assert_eq!(2, tally.count_matching(vote(9, 5, 1, VoterState::Searching).ballot()));
        assert_eq!(1, tally.count_matching(vote(9, 5, 3, VoterState::Searching).ballot()));

        // A newer vote from the same sender replaces the old one.
        tally.record_received(vote(3, 5, 1, VoterState::Searching));
        assert_eq!(3, tally.count_matching(vote(9, 5, 1, VoterState::Searching).ballot()));

        tally.clear_received();
        assert_eq!(0, tally.num_received());
    }

    #[test]
    fn established_leader_needs_quorum_and_the_leader_itself() {
        let mut tally = VoteTally::default();
        tally.record_out_of_election(vote(2, 5, 1, VoterState::Following));
        assert_eq!(None, tally.established_leader(2));

        // Quorum of followers, but no word from the leader.
        tally.record_out_of_election(vote(3, 5, 1, VoterState::Following));
        assert_eq!(None, tally.established_leader(2));

        tally.record_out_of_election(vote(1, 5, 1, VoterState::Leading));
        let leader = tally.established_leader(2).unwrap();
        assert_eq!(Sid::new(1), leader.sid);
        assert_eq!(Epoch::new(5), leader.election_epoch);
    }

    #[test]
    fn established_leader_ignores_split_epochs() {
        let mut tally = VoteTally::default();
        tally.record_out_of_election(vote(1, 6, 1, VoterState::Leading));
        tally.record_out_of_election(vote(2, 5, 1, VoterState::Following));
        assert_eq!(None, tally.established_leader(2));

        tally.record_out_of_election(vote(2, 6, 1, VoterState::Following));
        assert_eq!(Some(Epoch::new(6)), tally.established_leader(2).map(|v| v.election_epoch));
    }
}
