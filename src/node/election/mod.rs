mod election_state;
mod leader_tracker;
mod state_change_listener;
mod timers;
mod vote_tally;

use crate::node::Epoch;

pub(crate) use election_state::{ElectionConfig, ElectionState};
pub(crate) use leader_tracker::{LeaderPhase, LeaderTracker};
pub(crate) use state_change_listener::ElectionStateChangeListener;
pub use state_change_listener::{ElectionStateSnapshot, LeaderInfo};

/// TimerTick is what the election timers enqueue on the node actor. Each carries the epoch of the
/// stage that started the timer, so a tick that raced a transition is recognizably stale.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TimerTick {
    /// Searching: resend the current vote.
    RoundRetry(Epoch),
    /// Leading: check acks and send a Proposal to every follower.
    Heartbeat(Epoch),
    /// Following: nothing heard from the leader within the liveness timeout.
    LeaderSilent(Epoch),
}
