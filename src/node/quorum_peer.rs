use crate::actor::WeakActorClient;
use crate::node::election::{
    ElectionConfig, ElectionState, ElectionStateChangeListener, ElectionStateSnapshot, LeaderInfo, TimerTick,
};
use crate::node::outbox::Outbox;
use crate::node::peers::ClusterTracker;
use crate::node::replication::PendingWrite;
use crate::node::{PersistentLocalState, Sid};
use crate::route::{LearnerTables, RouteInfo};
use crate::store::{ByteLog, Store};
use crate::wire::{Ballot, QuorumMessage, Refuse, Vote, VoterState};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Votes from unknown senders are logged once, then once every this many drops.
const DROPPED_VOTE_LOG_EVERY: u64 = 100;

#[derive(Clone, Debug)]
pub(crate) struct QuorumPeerConfig {
    pub election: ElectionConfig,
    pub cluster_name: String,
    /// A follower silent for longer than this no longer counts towards the leader's quorum.
    pub ack_window: Duration,
    /// A learner silent for longer than this is dropped from the route table.
    pub learner_recycle_period: Duration,
    pub default_strategy: String,
}

/// QuorumPeer is one member's view of the election and of replication.
///
/// It owns the election state, the store and the epochs, and is only ever driven from the node
/// actor. Nothing in here blocks on the network: messages go out through the outbox and replies
/// come back as separate inbound events.
pub(crate) struct QuorumPeer<L: ByteLog, S: PersistentLocalState> {
    pub(super) logger: slog::Logger,
    pub(super) config: QuorumPeerConfig,
    pub(super) cluster: ClusterTracker,
    pub(super) local_state: S,
    pub(super) store: Store<L>,
    pub(super) learners: Arc<LearnerTables>,
    pub(super) outbox: Box<dyn Outbox>,
    pub(super) election: ElectionState,
    // The ballot we currently vote for. While Following or Leading, the ballot that won.
    pub(super) proposal: Ballot,
    // Leader writes appended but not yet held by a quorum, in offset order.
    pub(super) pending_writes: VecDeque<PendingWrite>,
    pub(super) dropped_votes: u64,
}

impl<L: ByteLog, S: PersistentLocalState> QuorumPeer<L, S> {
    /// Creates the peer and opens the first election round.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        logger: slog::Logger,
        config: QuorumPeerConfig,
        cluster: ClusterTracker,
        mut local_state: S,
        store: Store<L>,
        learners: Arc<LearnerTables>,
        outbox: Box<dyn Outbox>,
        actor_client: WeakActorClient,
    ) -> (Self, ElectionStateChangeListener) {
        // Segment headers carry the last established epoch across restarts.
        local_state.store_accepted_epoch_if_increased(store.epoch());
        local_state.store_election_epoch_if_increased(store.epoch());
        let clock = local_state.increment_election_epoch();

        let proposal = Ballot {
            election_epoch: clock,
            peer_epoch: local_state.accepted_epoch(),
            leader: cluster.my_sid(),
        };
        learners.set_maintainer(&config.cluster_name, None);

        let (election, listener) = ElectionState::new_searching(config.election.clone(), actor_client, clock);
        let mut peer = QuorumPeer {
            logger,
            config,
            cluster,
            local_state,
            store,
            learners,
            outbox,
            election,
            proposal,
            pending_writes: VecDeque::new(),
            dropped_votes: 0,
        };

        slog::info!(peer.logger, "Searching for a leader"; "Epoch" => clock.as_u64());
        peer.announce_proposal();

        (peer, listener)
    }

    pub(crate) fn handle_message(&mut self, message: QuorumMessage) {
        match message {
            QuorumMessage::Vote(vote) => self.handle_vote(vote),
            QuorumMessage::Proposal(proposal) => self.handle_proposal(proposal),
            QuorumMessage::Sync(sync) => self.handle_sync(sync),
            QuorumMessage::Refuse(refuse) => {
                slog::info!(self.logger, "Refused by {}: {}", refuse.sid, refuse.reason);
            }
        }
    }

    pub(crate) fn handle_timer(&mut self, tick: TimerTick) {
        match (tick, self.election.voter_state()) {
            (TimerTick::RoundRetry(epoch), VoterState::Searching) if epoch == self.election.epoch() => {
                let received = self.election.vote_tally_mut().map(|t| t.num_received()).unwrap_or(0);
                slog::info!(
                    self.logger,
                    "Stalled, awaiting quorum: {}/{} votes at epoch {}",
                    received,
                    self.cluster.quorum_size(),
                    epoch
                );
                let vote = self.own_vote();
                self.broadcast(QuorumMessage::Vote(vote));
            }
            (TimerTick::Heartbeat(epoch), VoterState::Leading) if epoch == self.election.epoch() => {
                self.leader_heartbeat();
            }
            (TimerTick::LeaderSilent(epoch), VoterState::Following) if epoch == self.election.epoch() => {
                slog::warn!(self.logger, "Leader {:?} went silent", self.election.leader().map(|l| l.sid));
                self.start_searching();
            }
            (tick, _) => {
                slog::debug!(self.logger, "Dropping stale {:?} in {:?}", tick, self.election);
            }
        }
    }

    pub(crate) fn election_state(&self) -> ElectionStateSnapshot {
        self.election.current_state()
    }

    pub(crate) fn my_sid(&self) -> Sid {
        self.cluster.my_sid()
    }

    pub(super) fn own_vote(&self) -> Vote {
        Vote::new(self.my_sid(), self.proposal, self.election.voter_state())
    }

    fn self_ballot(&self) -> Ballot {
        Ballot {
            election_epoch: self.local_state.election_epoch(),
            peer_epoch: self.local_state.accepted_epoch(),
            leader: self.my_sid(),
        }
    }

    pub(super) fn send(&self, to: Sid, message: QuorumMessage) {
        self.outbox.send(to, message);
    }

    pub(super) fn broadcast(&self, message: QuorumMessage) {
        for sid in self.cluster.peer_sids() {
            self.outbox.send(sid, message.clone());
        }
    }

    pub(super) fn start_searching(&mut self) {
        self.fail_pending_writes();
        let clock = self.local_state.increment_election_epoch();
        self.proposal = self.self_ballot();
        self.election.transition_to_searching(clock);
        self.learners.set_maintainer(&self.config.cluster_name, None);

        slog::info!(self.logger, "Searching for a leader"; "Epoch" => clock.as_u64());
        self.announce_proposal();
    }

    /// Counts our own vote, tells everyone, and checks whether that settled the round.
    fn announce_proposal(&mut self) {
        let vote = self.own_vote();
        if let Some(tally) = self.election.vote_tally_mut() {
            tally.record_received(vote);
        }
        self.broadcast(QuorumMessage::Vote(vote));
        self.try_conclude_round();
    }

    fn handle_vote(&mut self, vote: Vote) {
        if vote.sid == self.my_sid() || !self.cluster.contains_member(vote.sid) {
            // No link to answer on, we only dial configured members.
            self.drop_vote(&vote, "non-member sender");
            return;
        }
        if !self.cluster.contains_member(vote.leader) {
            self.drop_vote(&vote, "non-member leader");
            return;
        }

        if self.election.leader().map(|l| l.sid) == Some(vote.sid) && vote.leader != vote.sid {
            // We concluded on a ballot naming a node that settled on someone else.
            slog::info!(self.logger, "Leader {} backs {}, searching again", vote.sid, vote.leader);
            self.start_searching();
            return;
        }

        match self.election.voter_state() {
            VoterState::Searching => self.handle_vote_while_searching(vote),
            VoterState::Leading if self.blocked_by_our_epoch(&vote) => self.reestablish(vote),
            VoterState::Following | VoterState::Leading => self.answer_searching_voter(vote),
        }
    }

    fn drop_vote(&mut self, vote: &Vote, reason: &str) {
        self.dropped_votes += 1;
        if self.dropped_votes % DROPPED_VOTE_LOG_EVERY == 1 {
            slog::warn!(
                self.logger,
                "Dropping vote from {} for {}: {}",
                vote.sid,
                vote.leader,
                reason;
                "DroppedVotes" => self.dropped_votes
            );
        }
    }

    /// A searching voter that already accepted our epoch, or a later one, can never join us at
    /// our epoch.
    fn blocked_by_our_epoch(&self, vote: &Vote) -> bool {
        let epoch = self.election.epoch();
        vote.state == VoterState::Searching && vote.election_epoch > epoch && vote.peer_epoch >= epoch
    }

    /// Leads again at the voter's election epoch, which our followers and the voter can all
    /// still accept.
    fn reestablish(&mut self, vote: Vote) {
        let epoch = vote.election_epoch;
        self.local_state.store_election_epoch_if_increased(epoch);
        if !self.local_state.accept_leader(epoch, self.my_sid()) {
            slog::warn!(self.logger, "Cannot lead again at epoch {}, committed to another leader", epoch);
            self.answer_searching_voter(vote);
            return;
        }

        slog::info!(
            self.logger,
            "Voter {} cannot join at epoch {}, leading again",
            vote.sid,
            self.election.epoch();
            "Epoch" => epoch.as_u64()
        );
        self.proposal = Ballot {
            election_epoch: epoch,
            peer_epoch: epoch,
            leader: self.my_sid(),
        };
        self.become_leader(self.proposal);
    }

    fn handle_vote_while_searching(&mut self, vote: Vote) {
        let clock = self.local_state.election_epoch();

        if vote.state.is_established() {
            // Settled peers never move; they only tell us who they settled on.
            if let Some(tally) = self.election.vote_tally_mut() {
                tally.record_out_of_election(vote);
                if vote.election_epoch == clock {
                    tally.record_received(vote);
                }
            }
            self.try_conclude_round();
            return;
        }

        if vote.election_epoch > clock {
            self.local_state.store_election_epoch_if_increased(vote.election_epoch);
            self.election.advance_round(vote.election_epoch);
            self.proposal = self.self_ballot().max(vote.ballot());
            slog::debug!(self.logger, "Round moved to epoch {} by {}", vote.election_epoch, vote.sid);

            if let Some(tally) = self.election.vote_tally_mut() {
                tally.record_received(vote);
            }
            self.announce_proposal();
        } else if vote.election_epoch < clock {
            self.send(vote.sid, QuorumMessage::Refuse(Refuse::new(self.my_sid(), "stale election epoch")));
            self.send(vote.sid, QuorumMessage::Vote(self.own_vote()));
        } else {
            if let Some(tally) = self.election.vote_tally_mut() {
                tally.record_received(vote);
            }
            if vote.ballot() > self.proposal {
                self.proposal = vote.ballot();
                self.announce_proposal();
            } else {
                self.try_conclude_round();
            }
        }
    }

    fn answer_searching_voter(&mut self, vote: Vote) {
        if vote.state.is_established() {
            return;
        }
        if self.local_state.election_epoch() > vote.election_epoch {
            self.send(vote.sid, QuorumMessage::Refuse(Refuse::new(self.my_sid(), "stale election epoch")));
        }
        self.send(vote.sid, QuorumMessage::Vote(self.own_vote()));
    }

    fn try_conclude_round(&mut self) {
        let quorum = self.cluster.quorum_size();
        let proposal = self.proposal;
        let my_sid = self.my_sid();

        let (agreeing, established) = match self.election.vote_tally_mut() {
            Some(tally) => (tally.count_matching(proposal), tally.established_leader(quorum)),
            None => return,
        };

        if agreeing >= quorum {
            slog::info!(self.logger, "Round concluded with {}/{} votes for {:?}", agreeing, quorum, proposal);
            self.establish(proposal);
        } else if let Some(leader_vote) = established.filter(|v| v.leader != my_sid) {
            slog::info!(
                self.logger,
                "Joining established leader {} at epoch {}",
                leader_vote.leader,
                leader_vote.election_epoch
            );
            self.local_state.store_election_epoch_if_increased(leader_vote.election_epoch);
            if self.establish(leader_vote.ballot()) {
                self.proposal = leader_vote.ballot();
            }
        }
    }

    /// Commits to the ballot's leader at its epoch and takes our role in that leadership. False
    /// if we already committed to someone else at that epoch.
    fn establish(&mut self, ballot: Ballot) -> bool {
        let epoch = ballot.election_epoch;
        if !self.local_state.accept_leader(epoch, ballot.leader) {
            // Retries bring us back with a later round.
            slog::warn!(
                self.logger,
                "Not establishing {} at epoch {}, committed to another leader",
                ballot.leader,
                epoch
            );
            return false;
        }
        if ballot.leader == self.my_sid() {
            self.become_leader(ballot);
        } else {
            self.become_follower(ballot);
        }
        true
    }

    /// Takes the lead at the ballot's epoch. Writes wait until a quorum of followers holds our
    /// settled log.
    fn become_leader(&mut self, ballot: Ballot) {
        let epoch = ballot.election_epoch;
        // Catching up may replace our log, so earlier writes can no longer be vouched for.
        self.fail_pending_writes();
        self.election.transition_to_leading(epoch);

        let cluster_name = &self.config.cluster_name;
        self.learners.update_learner(cluster_name, &RouteInfo::default());
        self.learners.set_maintainer(cluster_name, None);

        slog::info!(self.logger, "Elected, discovering followers' logs"; "Epoch" => epoch.as_u64());
        // Peers still searching count this towards joining us.
        self.broadcast(QuorumMessage::Vote(self.own_vote()));
        // Followers of our previous leadership move to this epoch.
        self.broadcast_heartbeat();
        self.advance_discovery(false);
    }

    fn become_follower(&mut self, ballot: Ballot) {
        let leader = match self.cluster.metadata(ballot.leader) {
            Some(metadata) => LeaderInfo {
                sid: metadata.sid(),
                client_addr: metadata.client_addr(),
            },
            None => {
                slog::error!(self.logger, "Elected leader {} is not a member", ballot.leader);
                return;
            }
        };

        self.election.transition_to_following(leader.clone(), ballot.election_epoch);
        self.learners
            .set_maintainer(&self.config.cluster_name, Some(leader.client_addr.to_string()));

        slog::info!(self.logger, "Following {}", leader.sid; "Epoch" => ballot.election_epoch.as_u64());
        // Ack right away so the leader starts catching us up before its next heartbeat.
        self.ack_leader(leader.sid);
    }
}
