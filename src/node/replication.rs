use crate::actor::Callback;
use crate::node::election::{LeaderInfo, LeaderPhase};
use crate::node::quorum_peer::QuorumPeer;
use crate::node::{Epoch, IncrementError, IncrementInput, PersistentLocalState, RemoveInput, Sid, WriteOutput};
use crate::route::RouteInfo;
use crate::store::{Applied, ByteLog, ComponentRecord, LogPosition, RecordBatch, INITIAL_OFFSET};
use crate::wire::{Proposal, QuorumMessage, Refuse, RunningMode, Sync, VoterState};
use tokio::time::Instant;

/// Upper bound on record bytes carried by one Sync. Peers further behind catch up over several
/// rounds.
const SYNC_BATCH_BYTES: usize = 512 * 1024;

/// A write appended by the leader, answered once a quorum holds it.
pub(crate) struct PendingWrite {
    end: u64,
    output: WriteOutput,
    callback: Callback<WriteOutput, IncrementError>,
}

// Replication runs on Proposal/Sync exchanges:
//
//   leader  --Proposal{heartbeat, position}-->  follower     every heartbeat
//   leader  <--Proposal{ack, position}--------  follower     reply, and after applying a Sync
//   leader  --Sync{start, records}------------> follower     records in [its end, leader end)
//   leader  <--Sync{start, records}-----------  follower     only while the leader discovers
//
// A new leader first waits for a quorum of followers to ack its epoch, copies the most advanced
// log among them, and stamps that log with its epoch. It serves writes once a quorum holds the
// stamped log, and answers each write once a quorum holds the record.
impl<L: ByteLog, S: PersistentLocalState> QuorumPeer<L, S> {
    pub(crate) fn handle_increment(&mut self, input: IncrementInput, callback: Callback<WriteOutput, IncrementError>) {
        let appended = self
            .check_leader()
            .and_then(|()| Ok(self.store.increment(&input.key, &input.value)?));
        self.replicate_write(appended, callback);
    }

    pub(crate) fn handle_remove(&mut self, input: RemoveInput, callback: Callback<WriteOutput, IncrementError>) {
        let appended = self
            .check_leader()
            .and_then(|()| Ok(self.store.remove(&input.key)?));
        self.replicate_write(appended, callback);
    }

    /// Latest record for `key` as this node knows it. Followers may lag the leader.
    pub(crate) fn lookup(&self, key: &str) -> Option<ComponentRecord> {
        self.store.get(key).cloned()
    }

    fn check_leader(&self) -> Result<(), IncrementError> {
        match self.election.voter_state() {
            VoterState::Leading => match self.election.leader_tracker() {
                Some(tracker) if tracker.is_broadcasting() => Ok(()),
                _ => Err(IncrementError::NoLeader),
            },
            VoterState::Following => match self.election.leader() {
                Some(leader) => Err(IncrementError::NotLeader(leader.clone())),
                None => Err(IncrementError::NoLeader),
            },
            VoterState::Searching => Err(IncrementError::NoLeader),
        }
    }

    fn replicate_write(
        &mut self,
        appended: Result<ComponentRecord, IncrementError>,
        callback: Callback<WriteOutput, IncrementError>,
    ) {
        let record = match appended {
            Ok(record) => record,
            Err(e) => {
                callback.send(Err(e));
                return;
            }
        };

        self.pending_writes.push_back(PendingWrite {
            end: record.physical_offset + record.encoded_len(),
            output: WriteOutput { record },
            callback,
        });
        self.push_records();
        self.advance_commit();
    }

    /// Answers every pending write with `NoLeader`. Their records may still survive into a later
    /// leadership; the caller only learns that this one can no longer vouch for them.
    pub(super) fn fail_pending_writes(&mut self) {
        for pending in self.pending_writes.drain(..) {
            pending.callback.send(Err(IncrementError::NoLeader));
        }
    }

    pub(super) fn handle_proposal(&mut self, proposal: Proposal) {
        match self.election.voter_state() {
            VoterState::Leading if proposal.is_heartbeat() => {
                slog::debug!(
                    self.logger,
                    "Heartbeat from competing leader {} at epoch {}",
                    proposal.sid,
                    proposal.epoch
                );
            }
            VoterState::Leading => self.handle_follower_ack(proposal),
            VoterState::Following => self.handle_leader_proposal(proposal),
            VoterState::Searching => {
                slog::debug!(self.logger, "Ignoring Proposal from {} while searching", proposal.sid);
            }
        }
    }

    fn heartbeat(&self) -> Proposal {
        Proposal::heartbeat(self.my_sid(), self.election.epoch(), self.store.position())
    }

    pub(super) fn broadcast_heartbeat(&self) {
        self.broadcast(QuorumMessage::Proposal(self.heartbeat()));
    }

    pub(super) fn ack_leader(&self, leader: Sid) {
        let ack = Proposal::ack(self.my_sid(), leader, self.election.epoch(), self.store.position());
        self.send(leader, QuorumMessage::Proposal(ack));
    }

    fn handle_leader_proposal(&mut self, proposal: Proposal) {
        let leader = match self.election.leader() {
            Some(leader) if leader.sid == proposal.sid => leader.clone(),
            _ => {
                // The sender believes we lead or follow it. Our vote tells it whom we actually follow.
                slog::debug!(self.logger, "Proposal from {}, not our leader", proposal.sid);
                self.send(proposal.sid, QuorumMessage::Vote(self.own_vote()));
                return;
            }
        };
        if !proposal.is_heartbeat() {
            slog::debug!(self.logger, "Leader {} acks {}, ignoring", proposal.sid, proposal.leader);
            return;
        }

        let following = self.election.epoch();
        if proposal.epoch < following {
            slog::debug!(self.logger, "Ignoring heartbeat from {} at old epoch {}", proposal.sid, proposal.epoch);
            return;
        }
        if proposal.epoch > following && !self.follow_at_epoch(leader, proposal.epoch) {
            return;
        }

        self.election.leader_seen(proposal.sid);
        self.ack_leader(proposal.sid);
        if self.store.position() > proposal.position {
            self.push_to_leader(proposal.sid, proposal.position);
        }
    }

    /// Sends our leader the part of our log it is missing, or all of it when the two logs were
    /// written under different epochs.
    fn push_to_leader(&self, leader: Sid, leader_position: LogPosition) {
        let own = self.store.position();
        let from = if own.epoch == leader_position.epoch && leader_position.offset <= own.offset {
            leader_position.offset
        } else {
            INITIAL_OFFSET
        };
        let (start_offset, batch) = match self.read_batch(leader, from, own.offset) {
            Some(read) => read,
            None => return,
        };

        slog::debug!(self.logger, "Leader {} is behind at {:?}, sending from {}", leader, leader_position, start_offset);
        let sync = Sync {
            sid: self.my_sid(),
            epoch: self.election.epoch(),
            log_epoch: own.epoch,
            start_offset,
            mode: RunningMode::Cluster,
            route: RouteInfo::default(),
            data: batch.data,
        };
        self.send(leader, QuorumMessage::Sync(sync));
    }

    fn handle_follower_ack(&mut self, ack: Proposal) {
        let follower = match self.cluster.metadata(ack.sid) {
            Some(metadata) => metadata.clone(),
            None => {
                slog::warn!(self.logger, "Ack from non-member {}", ack.sid);
                return;
            }
        };
        let epoch = self.election.epoch();
        if ack.leader != self.my_sid() || ack.epoch != epoch {
            if ack.leader == self.my_sid() && ack.epoch < epoch {
                // It still follows our previous leadership.
                self.send(ack.sid, QuorumMessage::Proposal(self.heartbeat()));
            } else {
                slog::debug!(
                    self.logger,
                    "Ignoring ack from {} for leader {} at epoch {}",
                    ack.sid,
                    ack.leader,
                    ack.epoch
                );
            }
            return;
        }

        let phase = match self.election.leader_tracker_mut() {
            Some(tracker) => {
                tracker.record_ack(ack.sid, ack.position, Instant::now());
                tracker.phase()
            }
            None => return,
        };

        let addr = follower.client_addr().to_string();
        match self
            .learners
            .register_learner(&self.config.cluster_name, ack.sid, &addr, follower.weight())
        {
            Ok(true) => slog::info!(self.logger, "Registered learner {} at {}", ack.sid, addr),
            Ok(false) => {}
            Err(e) => slog::warn!(self.logger, "Cannot register learner {}: {}", ack.sid, e),
        }

        match phase {
            LeaderPhase::Discovering { .. } => self.advance_discovery(false),
            LeaderPhase::Synchronizing { .. } | LeaderPhase::Broadcasting { .. } => {
                self.send_sync(ack.sid, ack.position);
                self.advance_activation();
                self.advance_commit();
            }
        }
    }

    /// Once a quorum has committed to our epoch, copies the most advanced log among them. When no
    /// live follower is ahead of us, our own log is settled and synchronization starts.
    ///
    /// `renew` asks the current source for its next batch even if the source did not change.
    pub(super) fn advance_discovery(&mut self, renew: bool) {
        let now = Instant::now();
        let own = self.store.position();
        let (live, best, source) = match self.election.leader_tracker() {
            Some(tracker) => match tracker.phase() {
                LeaderPhase::Discovering { source } => (
                    tracker.num_live_members(now, self.config.ack_window),
                    tracker.most_advanced(now, self.config.ack_window),
                    source,
                ),
                _ => return,
            },
            None => return,
        };
        if live < self.cluster.quorum_size() {
            return;
        }

        match best {
            Some((sid, position)) if position > own => {
                if source != Some(sid) {
                    slog::info!(self.logger, "Catching up from {} at {:?}, own log at {:?}", sid, position, own);
                    if let Some(tracker) = self.election.leader_tracker_mut() {
                        tracker.set_phase(LeaderPhase::Discovering { source: Some(sid) });
                    }
                } else if !renew {
                    return;
                }
                // Our heartbeat shows the source where our log ends.
                self.send(sid, QuorumMessage::Proposal(self.heartbeat()));
            }
            _ => self.settle_log(own),
        }
    }

    fn settle_log(&mut self, base: LogPosition) {
        let epoch = self.election.epoch();
        if let Err(e) = self.store.begin_epoch(epoch) {
            slog::error!(self.logger, "Cannot stamp own log with epoch {}: {}", epoch, e);
            self.start_searching();
            return;
        }

        let followers = match self.election.leader_tracker_mut() {
            Some(tracker) => {
                tracker.set_phase(LeaderPhase::Synchronizing { base });
                tracker.follower_positions()
            }
            None => return,
        };
        slog::info!(self.logger, "Log settled at {:?}, synchronizing followers", base; "Epoch" => epoch.as_u64());

        for (sid, position) in followers {
            self.send_sync(sid, position);
        }
        self.advance_activation();
    }

    fn advance_activation(&mut self) {
        let epoch = self.election.epoch();
        let (base, reaching) = match self.election.leader_tracker() {
            Some(tracker) => match tracker.phase() {
                LeaderPhase::Synchronizing { base } => {
                    (base, tracker.num_reaching(LogPosition::new(epoch, base.offset)))
                }
                _ => return,
            },
            None => return,
        };
        if reaching < self.cluster.quorum_size() {
            return;
        }

        self.election.activate(base);
        let cluster_name = &self.config.cluster_name;
        self.learners.set_strategy(cluster_name, &self.config.default_strategy);
        self.learners
            .set_maintainer(cluster_name, Some(self.cluster.my_metadata().client_addr().to_string()));
        slog::info!(self.logger, "Leading with {}/{} members synchronized", reaching, self.cluster.num_members(); "Epoch" => epoch.as_u64());

        self.advance_commit();
    }

    /// Answers pending writes that a quorum now holds.
    fn advance_commit(&mut self) {
        let epoch = self.election.epoch();
        let committed = match self.election.leader_tracker() {
            Some(tracker) if tracker.is_broadcasting() => {
                tracker.quorum_offset(epoch, self.store.end_offset(), self.cluster.quorum_size())
            }
            _ => None,
        };
        let committed = match committed {
            Some(offset) => offset,
            None => return,
        };

        while self.pending_writes.front().map_or(false, |pending| pending.end <= committed) {
            if let Some(pending) = self.pending_writes.pop_front() {
                pending.callback.send(Ok(pending.output));
            }
        }
    }

    /// Pushes freshly appended records to followers that hold our log, without waiting for their
    /// next ack.
    fn push_records(&mut self) {
        let epoch = self.election.epoch();
        let unsent = match self.election.leader_tracker() {
            Some(tracker) => tracker.unsent(epoch, self.store.end_offset()),
            None => return,
        };
        for (sid, from) in unsent {
            self.send_sync(sid, LogPosition::new(epoch, from));
        }
    }

    fn send_sync(&mut self, follower: Sid, position: LogPosition) {
        let (sync, next_offset) = match self.build_sync(follower, position) {
            Some(built) => built,
            None => return,
        };
        self.send(follower, QuorumMessage::Sync(sync));
        if let Some(tracker) = self.election.leader_tracker_mut() {
            tracker.mark_sent(follower, next_offset);
        }
    }

    /// Records a follower at `position` is missing. A follower whose log is not a prefix of ours
    /// gets everything from the start.
    fn build_sync(&self, follower: Sid, position: LogPosition) -> Option<(Sync, u64)> {
        let epoch = self.election.epoch();
        let base = match self.election.leader_tracker().map(|tracker| tracker.phase()) {
            Some(LeaderPhase::Synchronizing { base }) | Some(LeaderPhase::Broadcasting { base }) => base,
            _ => return None,
        };
        let end = self.store.end_offset();

        let is_prefix = (position.epoch == epoch && position.offset <= end)
            || (position.epoch == base.epoch && position.offset <= base.offset);
        let from = if is_prefix {
            position.offset
        } else {
            slog::info!(self.logger, "Follower {} diverged at {:?}, resyncing it from scratch", follower, position);
            INITIAL_OFFSET
        };
        let (start_offset, batch) = self.read_batch(follower, from, end)?;

        // Until it reaches our base, the follower holds a copy of the log we started from.
        let log_epoch = if batch.next_offset >= base.offset { epoch } else { base.epoch };
        let sync = Sync {
            sid: self.my_sid(),
            epoch,
            log_epoch,
            start_offset,
            mode: RunningMode::Cluster,
            route: (*self.learners.route_info(&self.config.cluster_name)).clone(),
            data: batch.data,
        };
        Some((sync, batch.next_offset))
    }

    /// Reads from `from`, falling back to the start of the log if `from` is not a record boundary.
    fn read_batch(&self, peer: Sid, from: u64, to: u64) -> Option<(u64, RecordBatch)> {
        match self.store.read_range(from, to, SYNC_BATCH_BYTES) {
            Ok(batch) => return Some((from, batch)),
            Err(e) if from != INITIAL_OFFSET => {
                slog::warn!(self.logger, "Offset {} of {} unusable ({}), sending from scratch", from, peer, e);
            }
            Err(e) => {
                slog::error!(self.logger, "Cannot read own store for {}: {}", peer, e);
                return None;
            }
        }

        match self.store.read_range(INITIAL_OFFSET, to, SYNC_BATCH_BYTES) {
            Ok(batch) => Some((INITIAL_OFFSET, batch)),
            Err(e) => {
                slog::error!(self.logger, "Cannot read own store for {}: {}", peer, e);
                None
            }
        }
    }

    pub(super) fn leader_heartbeat(&mut self) {
        let now = Instant::now();
        let (live, silent, leading_for) = match self.election.leader_tracker() {
            Some(tracker) => (
                tracker.num_live_members(now, self.config.ack_window),
                tracker.silent_since(now, self.config.learner_recycle_period),
                now.saturating_duration_since(tracker.established_at()),
            ),
            None => return,
        };

        // Followers get one ack window to find a new leader.
        if live < self.cluster.quorum_size() && leading_for > self.config.ack_window {
            slog::warn!(
                self.logger,
                "Lost quorum: {}/{} members acked within {:?}",
                live,
                self.cluster.quorum_size(),
                self.config.ack_window
            );
            self.start_searching();
            return;
        }

        for sid in silent {
            if self.learners.unregister_learner(&self.config.cluster_name, sid) {
                slog::info!(self.logger, "Evicted silent learner {}", sid);
            }
        }

        self.broadcast_heartbeat();
    }

    pub(super) fn handle_sync(&mut self, sync: Sync) {
        if sync.epoch < self.local_state.accepted_epoch() {
            slog::info!(self.logger, "Refusing Sync from {} at stale epoch {}", sync.sid, sync.epoch);
            self.send(sync.sid, QuorumMessage::Refuse(Refuse::new(self.my_sid(), "stale sync epoch")));
            return;
        }

        match self.election.voter_state() {
            VoterState::Leading => self.handle_catch_up_sync(sync),
            VoterState::Following => self.handle_leader_sync(sync),
            VoterState::Searching => {
                slog::debug!(self.logger, "Ignoring Sync from {} while searching", sync.sid);
            }
        }
    }

    fn handle_catch_up_sync(&mut self, sync: Sync) {
        let source = match self.election.leader_tracker().map(|tracker| tracker.phase()) {
            Some(LeaderPhase::Discovering { source }) => source,
            _ => None,
        };
        if source != Some(sync.sid) || sync.epoch != self.election.epoch() {
            slog::debug!(self.logger, "Ignoring Sync from {}, not catching up from it", sync.sid);
            return;
        }

        self.apply_sync_data(&sync);
        self.advance_discovery(true);
    }

    fn handle_leader_sync(&mut self, sync: Sync) {
        let leader = match self.election.leader() {
            Some(leader) if leader.sid == sync.sid => leader.clone(),
            _ => {
                slog::debug!(self.logger, "Ignoring Sync from {}, not our leader", sync.sid);
                return;
            }
        };
        let following = self.election.epoch();
        if sync.epoch < following {
            slog::debug!(self.logger, "Ignoring Sync from {} at old epoch {}", sync.sid, sync.epoch);
            return;
        }
        // Our leader won a later round without us.
        if sync.epoch > following && !self.follow_at_epoch(leader, sync.epoch) {
            return;
        }

        self.election.leader_seen(sync.sid);
        self.adopt_route(&sync);
        if self.apply_sync_data(&sync) {
            // Report progress and pull the next batch without waiting for a heartbeat.
            self.ack_leader(sync.sid);
        }
    }

    /// Follows `leader` at the later `epoch` it moved to. False if we already committed to
    /// another leader at that epoch.
    pub(super) fn follow_at_epoch(&mut self, leader: LeaderInfo, epoch: Epoch) -> bool {
        if !self.local_state.accept_leader(epoch, leader.sid) {
            slog::warn!(self.logger, "Not following {} at epoch {}, committed to another leader", leader.sid, epoch);
            return false;
        }

        slog::info!(self.logger, "Leader {} moved to epoch {}", leader.sid, epoch);
        self.local_state.store_election_epoch_if_increased(epoch);
        self.proposal.election_epoch = epoch;
        self.proposal.peer_epoch = epoch;
        self.proposal.leader = leader.sid;
        self.election.transition_to_following(leader, epoch);
        // Peers still searching count this towards joining our leader.
        self.broadcast(QuorumMessage::Vote(self.own_vote()));
        true
    }

    fn adopt_route(&self, sync: &Sync) {
        let cluster_name = &self.config.cluster_name;
        if self.learners.update_learner(cluster_name, &sync.route) {
            slog::debug!(self.logger, "Learners now {:?}", sync.route.learners.keys().collect::<Vec<_>>());
        }
        self.learners.set_maintainer(cluster_name, sync.route.maintainer.clone());
        self.learners.set_strategy(cluster_name, &sync.route.strategy);
    }

    /// Applies Sync records in order, then stamps the log with the Sync's log epoch. Returns
    /// whether our position moved. Any inconsistency discards the store, and the next ack asks
    /// for everything from the start.
    fn apply_sync_data(&mut self, sync: &Sync) -> bool {
        let before = self.store.position();
        if sync.start_offset > before.offset {
            slog::debug!(self.logger, "Sync starts at {} past our end {}", sync.start_offset, before.offset);
            return false;
        }
        if sync.start_offset == INITIAL_OFFSET && (before.offset > INITIAL_OFFSET || before.epoch != sync.log_epoch) {
            slog::info!(
                self.logger,
                "Full resync from {}, discarding {} bytes at {:?}",
                sync.sid,
                before.offset - INITIAL_OFFSET,
                before
            );
            if !self.reset_store(sync.log_epoch) {
                return false;
            }
        }

        let records = match ComponentRecord::decode_all(&sync.data) {
            Ok(records) => records,
            Err(e) => {
                slog::warn!(self.logger, "Corrupt Sync data: {}", e);
                self.reset_store(Epoch::new(0));
                return true;
            }
        };

        let mut appended = 0;
        for record in records {
            match self.store.apply(record) {
                Ok(Applied::Appended) => appended += 1,
                Ok(Applied::AlreadyApplied) => {}
                Err(e) => {
                    slog::warn!(self.logger, "Cannot apply replicated record: {}", e);
                    self.reset_store(Epoch::new(0));
                    return true;
                }
            }
        }
        if sync.log_epoch > self.store.epoch() {
            if let Err(e) = self.store.begin_epoch(sync.log_epoch) {
                slog::warn!(self.logger, "Cannot stamp log with epoch {}: {}", sync.log_epoch, e);
            }
        }

        if appended > 0 {
            slog::debug!(self.logger, "Applied {} records, now at {:?}", appended, self.store.position());
        }
        self.store.position() != before
    }

    fn reset_store(&mut self, epoch: Epoch) -> bool {
        match self.store.reset(epoch) {
            Ok(()) => true,
            Err(e) => {
                slog::error!(self.logger, "Cannot reset store: {}", e);
                false
            }
        }
    }
}
