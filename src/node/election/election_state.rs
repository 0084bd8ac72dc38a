use crate::actor::WeakActorClient;
use crate::node::election::leader_tracker::{LeaderPhase, LeaderTracker};
use crate::node::election::state_change_listener::{self, ElectionStateChangeNotifier};
use crate::node::election::timers::{LivenessTimerHandle, TickerHandle};
use crate::node::election::vote_tally::VoteTally;
use crate::node::election::{ElectionStateChangeListener, ElectionStateSnapshot, LeaderInfo, TimerTick};
use crate::node::{Epoch, Sid};
use crate::store::LogPosition;
use crate::wire::VoterState;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct ElectionConfig {
    pub my_sid: Sid,
    pub heartbeat_interval: Duration,
    pub liveness_min_timeout: Duration,
    pub liveness_max_timeout: Duration,
    pub round_retry_interval: Duration,
}

/// ElectionState holds what belongs to the current stage of the election, including the timer
/// that drives that stage. Replacing the state drops the old timers, which stops them.
///
/// It decides nothing on its own; the quorum peer decides when to move between states.
pub(crate) struct ElectionState {
    state: State,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    notifier: ElectionStateChangeNotifier,
}

enum State {
    Searching(SearchingState),
    Following(FollowingState),
    Leading(LeadingState),
}

struct SearchingState {
    epoch: Epoch,
    tally: VoteTally,
    _round_retry: TickerHandle,
}

struct FollowingState {
    leader: LeaderInfo,
    epoch: Epoch,
    liveness: LivenessTimerHandle,
}

struct LeadingState {
    epoch: Epoch,
    tracker: LeaderTracker,
    _heartbeat: TickerHandle,
}

impl ElectionState {
    pub(crate) fn new_searching(
        config: ElectionConfig,
        actor_client: WeakActorClient,
        epoch: Epoch,
    ) -> (Self, ElectionStateChangeListener) {
        let initial = State::Searching(SearchingState::new(&config, actor_client.clone(), epoch));
        let (notifier, listener) = state_change_listener::new(Self::snapshot_of(&initial));

        let election_state = ElectionState {
            state: initial,
            config,
            actor_client,
            notifier,
        };
        (election_state, listener)
    }

    pub(crate) fn transition_to_searching(&mut self, epoch: Epoch) {
        self.state = State::Searching(SearchingState::new(&self.config, self.actor_client.clone(), epoch));
        self.notify();
    }

    pub(crate) fn transition_to_following(&mut self, leader: LeaderInfo, epoch: Epoch) {
        let liveness = LivenessTimerHandle::spawn(
            self.config.liveness_min_timeout,
            self.config.liveness_max_timeout,
            TimerTick::LeaderSilent(epoch),
            self.actor_client.clone(),
        );
        self.state = State::Following(FollowingState {
            leader,
            epoch,
            liveness,
        });
        self.notify();
    }

    /// Listeners keep seeing Searching until `activate` is called.
    pub(crate) fn transition_to_leading(&mut self, epoch: Epoch) {
        let heartbeat = TickerHandle::spawn(
            self.config.heartbeat_interval,
            true,
            TimerTick::Heartbeat(epoch),
            self.actor_client.clone(),
        );
        self.state = State::Leading(LeadingState {
            epoch,
            tracker: LeaderTracker::new(tokio::time::Instant::now()),
            _heartbeat: heartbeat,
        });
        self.notify();
    }

    /// Moves a synchronized leadership to Broadcasting and publishes it. No-op unless Leading.
    pub(crate) fn activate(&mut self, base: LogPosition) {
        if let State::Leading(ls) = &mut self.state {
            ls.tracker.set_phase(LeaderPhase::Broadcasting { base });
        }
        self.notify();
    }

    /// Moves a running round to a higher epoch. Votes from the old epoch are dropped and the retry
    /// ticker is restarted for the new one. No-op unless Searching.
    pub(crate) fn advance_round(&mut self, epoch: Epoch) {
        if let State::Searching(ss) = &mut self.state {
            ss.epoch = epoch;
            ss.tally.clear_received();
            ss._round_retry = TickerHandle::spawn(
                self.config.round_retry_interval,
                false,
                TimerTick::RoundRetry(epoch),
                self.actor_client.clone(),
            );
        }
    }

    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        Self::snapshot_of(&self.state)
    }

    fn snapshot_of(state: &State) -> ElectionStateSnapshot {
        match state {
            State::Searching(_) => ElectionStateSnapshot::Searching,
            State::Following(fs) => ElectionStateSnapshot::Following(fs.leader.clone()),
            State::Leading(ls) if ls.tracker.is_broadcasting() => ElectionStateSnapshot::Leading,
            State::Leading(_) => ElectionStateSnapshot::Searching,
        }
    }

    fn notify(&self) {
        self.notifier.notify(self.current_state());
    }

    pub(crate) fn voter_state(&self) -> VoterState {
        match &self.state {
            State::Searching(_) => VoterState::Searching,
            State::Following(_) => VoterState::Following,
            State::Leading(_) => VoterState::Leading,
        }
    }

    /// Epoch the current stage was entered at: the round's epoch while Searching, the
    /// established epoch otherwise.
    pub(crate) fn epoch(&self) -> Epoch {
        match &self.state {
            State::Searching(ss) => ss.epoch,
            State::Following(fs) => fs.epoch,
            State::Leading(ls) => ls.epoch,
        }
    }

    /// Tally of the running round, or None if not Searching.
    pub(crate) fn vote_tally_mut(&mut self) -> Option<&mut VoteTally> {
        match &mut self.state {
            State::Searching(ss) => Some(&mut ss.tally),
            _ => None,
        }
    }

    pub(crate) fn leader_tracker(&self) -> Option<&LeaderTracker> {
        match &self.state {
            State::Leading(ls) => Some(&ls.tracker),
            _ => None,
        }
    }

    pub(crate) fn leader_tracker_mut(&mut self) -> Option<&mut LeaderTracker> {
        match &mut self.state {
            State::Leading(ls) => Some(&mut ls.tracker),
            _ => None,
        }
    }

    pub(crate) fn leader(&self) -> Option<&LeaderInfo> {
        match &self.state {
            State::Following(fs) => Some(&fs.leader),
            _ => None,
        }
    }

    /// Postpones the liveness timeout if we follow `sid`. Returns false if we don't.
    pub(crate) fn leader_seen(&self, sid: Sid) -> bool {
        match &self.state {
            State::Following(fs) if fs.leader.sid == sid => {
                fs.liveness.leader_seen();
                true
            }
            _ => false,
        }
    }
}

impl SearchingState {
    fn new(config: &ElectionConfig, actor_client: WeakActorClient, epoch: Epoch) -> Self {
        SearchingState {
            epoch,
            tally: VoteTally::default(),
            _round_retry: TickerHandle::spawn(
                config.round_retry_interval,
                false,
                TimerTick::RoundRetry(epoch),
                actor_client,
            ),
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Searching(ss) => write!(f, "Searching(epoch={})", ss.epoch),
            State::Following(fs) => write!(f, "Following(leader={}, epoch={})", fs.leader.sid, fs.epoch),
            State::Leading(ls) => write!(f, "Leading(epoch={}, {:?})", ls.epoch, ls.tracker.phase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;

    fn config() -> ElectionConfig {
        ElectionConfig {
            my_sid: Sid::new(1),
            heartbeat_interval: Duration::from_secs(60),
            liveness_min_timeout: Duration::from_secs(60),
            liveness_max_timeout: Duration::from_secs(60),
            round_retry_interval: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn transitions_are_published() {
        // -- setup --
        let (actor_client, _rx) = ActorClient::new(10);
        let (mut state, mut listener) = ElectionState::new_searching(config(), actor_client.weak(), Epoch::new(1));
        assert_eq!(ElectionStateSnapshot::Searching, listener.current());
        assert!(state.vote_tally_mut().is_some());

        // -- execute & verify --
        let leader = LeaderInfo {
            sid: Sid::new(2),
            client_addr: "127.0.0.1:9002".parse().unwrap(),
        };
        state.transition_to_following(leader.clone(), Epoch::new(1));
        assert_eq!(Some(ElectionStateSnapshot::Following(leader)), listener.next().await);
        assert!(state.leader_seen(Sid::new(2)));
        assert!(!state.leader_seen(Sid::new(3)));
        assert!(state.vote_tally_mut().is_none());

        // A leader that has not synchronized a quorum yet is not published.
        state.transition_to_leading(Epoch::new(2));
        assert_eq!(Some(ElectionStateSnapshot::Searching), listener.next().await);
        assert_eq!(VoterState::Leading, state.voter_state());
        assert_eq!(Epoch::new(2), state.epoch());
        assert!(!state.leader_tracker().unwrap().is_broadcasting());
        assert_eq!(None, state.leader());

        state.activate(LogPosition::new(Epoch::new(1), 64));
        assert_eq!(Some(ElectionStateSnapshot::Leading), listener.next().await);
        assert!(state.leader_tracker().unwrap().is_broadcasting());
    }

    #[tokio::test]
    async fn listener_ends_with_state() {
        let (actor_client, _rx) = ActorClient::new(10);
        let (state, mut listener) = ElectionState::new_searching(config(), actor_client.weak(), Epoch::new(1));
        drop(state);
        assert_eq!(None, listener.next().await);
    }
}
