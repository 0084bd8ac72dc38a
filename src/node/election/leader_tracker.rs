use crate::node::{Epoch, Sid};
use crate::store::LogPosition;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// How far a leadership has come since its round concluded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum LeaderPhase {
    /// Waiting for a quorum of followers to commit to our epoch, then catching up from the most
    /// advanced log among them. `source` is the follower we currently copy from.
    Discovering { source: Option<Sid> },
    /// Our log is settled. `base` is where it ended before we stamped it with our epoch.
    /// Followers copy it until a quorum holds it.
    Synchronizing { base: LogPosition },
    /// Serving writes.
    Broadcasting { base: LogPosition },
}

struct FollowerProgress {
    last_ack: Instant,
    position: LogPosition,
    // Offset up to which records were pushed ahead of the follower's next ack.
    sent: u64,
}

/// LeaderTracker follows the members that committed to this leadership: when each last acked,
/// where its log ends, and which phase the leadership is in.
///
/// Only acks carrying our own epoch are recorded. No follower counts as live until it acks.
pub(crate) struct LeaderTracker {
    established_at: Instant,
    phase: LeaderPhase,
    followers: HashMap<Sid, FollowerProgress>,
}

impl LeaderTracker {
    pub(super) fn new(now: Instant) -> Self {
        LeaderTracker {
            established_at: now,
            phase: LeaderPhase::Discovering { source: None },
            followers: HashMap::new(),
        }
    }

    pub(crate) fn established_at(&self) -> Instant {
        self.established_at
    }

    pub(crate) fn phase(&self) -> LeaderPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: LeaderPhase) {
        self.phase = phase;
    }

    pub(crate) fn is_broadcasting(&self) -> bool {
        matches!(self.phase, LeaderPhase::Broadcasting { .. })
    }

    pub(crate) fn record_ack(&mut self, sid: Sid, position: LogPosition, now: Instant) {
        let progress = self.followers.entry(sid).or_insert(FollowerProgress {
            last_ack: now,
            position,
            sent: position.offset,
        });
        progress.last_ack = now;
        progress.position = position;
        progress.sent = position.offset;
    }

    /// Every follower that acked so far, in sid order.
    pub(crate) fn follower_positions(&self) -> Vec<(Sid, LogPosition)> {
        let mut positions: Vec<(Sid, LogPosition)> = self
            .followers
            .iter()
            .map(|(sid, progress)| (*sid, progress.position))
            .collect();
        positions.sort();
        positions
    }

    /// Members, the leader included, that acked within `window` of `now`.
    pub(crate) fn num_live_members(&self, now: Instant, window: Duration) -> usize {
        1 + self.live(now, window).count()
    }

    /// The live follower with the most advanced log. Ties go to the higher sid.
    pub(crate) fn most_advanced(&self, now: Instant, window: Duration) -> Option<(Sid, LogPosition)> {
        self.live(now, window)
            .map(|(sid, progress)| (*sid, progress.position))
            .max_by_key(|(sid, position)| (*position, *sid))
    }

    /// Members, the leader included, whose log reaches `target`.
    pub(crate) fn num_reaching(&self, target: LogPosition) -> usize {
        1 + self
            .followers
            .values()
            .filter(|progress| progress.position >= target)
            .count()
    }

    /// Highest offset held at `epoch` by at least `quorum` members, the leader's `own_end`
    /// included. None if fewer than `quorum` members hold anything at `epoch`.
    pub(crate) fn quorum_offset(&self, epoch: Epoch, own_end: u64, quorum: usize) -> Option<u64> {
        let mut offsets: Vec<u64> = self
            .followers
            .values()
            .filter(|progress| progress.position.epoch == epoch)
            .map(|progress| progress.position.offset)
            .collect();
        offsets.push(own_end);
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        quorum.checked_sub(1).and_then(|i| offsets.get(i).copied())
    }

    /// Followers holding our log at `epoch` that were not yet sent everything up to `end`, with
    /// the offset to send from.
    pub(crate) fn unsent(&self, epoch: Epoch, end: u64) -> Vec<(Sid, u64)> {
        let mut unsent: Vec<(Sid, u64)> = self
            .followers
            .iter()
            .filter(|(_, progress)| progress.position.epoch == epoch && progress.sent < end)
            .map(|(sid, progress)| (*sid, progress.sent))
            .collect();
        unsent.sort();
        unsent
    }

    pub(crate) fn mark_sent(&mut self, sid: Sid, offset: u64) {
        if let Some(progress) = self.followers.get_mut(&sid) {
            progress.sent = progress.sent.max(offset);
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        self.established_at -= by;
    }

    /// Followers whose last ack is older than `period`.
    pub(crate) fn silent_since(&self, now: Instant, period: Duration) -> Vec<Sid> {
        let mut silent: Vec<Sid> = self
            .followers
            .iter()
            .filter(|(_, progress)| now.saturating_duration_since(progress.last_ack) > period)
            .map(|(sid, _)| *sid)
            .collect();
        silent.sort();
        silent
    }

    fn live(&self, now: Instant, window: Duration) -> impl Iterator<Item = (&Sid, &FollowerProgress)> {
        self.followers
            .iter()
            .filter(move |(_, progress)| now.saturating_duration_since(progress.last_ack) <= window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(epoch: u64, offset: u64) -> LogPosition {
        LogPosition::new(Epoch::new(epoch), offset)
    }

    #[test]
    fn followers_count_only_after_acking() {
        let start = Instant::now();
        let window = Duration::from_millis(500);
        let mut tracker = LeaderTracker::new(start);
        assert_eq!(1, tracker.num_live_members(start, window));
        assert_eq!(LeaderPhase::Discovering { source: None }, tracker.phase());

        tracker.record_ack(Sid::new(2), at(1, 64), start);
        let later = start + Duration::from_millis(600);
        tracker.record_ack(Sid::new(3), at(1, 64), later);
        assert_eq!(2, tracker.num_live_members(later, window));

        let much_later = later + Duration::from_secs(1);
        assert_eq!(1, tracker.num_live_members(much_later, window));
    }

    #[test]
    fn most_advanced_prefers_epoch_over_offset() {
        let now = Instant::now();
        let window = Duration::from_millis(500);
        let mut tracker = LeaderTracker::new(now);
        tracker.record_ack(Sid::new(2), at(1, 900), now);
        tracker.record_ack(Sid::new(3), at(2, 100), now);
        tracker.record_ack(Sid::new(4), at(2, 100), now);

        assert_eq!(Some((Sid::new(4), at(2, 100))), tracker.most_advanced(now, window));
        assert_eq!(3, tracker.num_reaching(at(2, 100)));
    }

    #[test]
    fn quorum_offset_counts_only_our_epoch() {
        let now = Instant::now();
        let mut tracker = LeaderTracker::new(now);
        tracker.record_ack(Sid::new(2), at(3, 200), now);
        tracker.record_ack(Sid::new(3), at(2, 500), now);
        tracker.record_ack(Sid::new(4), at(3, 100), now);

        assert_eq!(Some(300), tracker.quorum_offset(Epoch::new(3), 300, 1));
        assert_eq!(Some(200), tracker.quorum_offset(Epoch::new(3), 300, 2));
        assert_eq!(Some(100), tracker.quorum_offset(Epoch::new(3), 300, 3));
        assert_eq!(None, tracker.quorum_offset(Epoch::new(3), 300, 4));
    }

    #[test]
    fn sent_offsets_reset_on_ack() {
        let now = Instant::now();
        let mut tracker = LeaderTracker::new(now);
        tracker.record_ack(Sid::new(2), at(3, 100), now);
        tracker.record_ack(Sid::new(3), at(2, 100), now);
        assert_eq!(vec![(Sid::new(2), 100)], tracker.unsent(Epoch::new(3), 300));

        tracker.mark_sent(Sid::new(2), 300);
        assert!(tracker.unsent(Epoch::new(3), 300).is_empty());

        tracker.record_ack(Sid::new(2), at(3, 200), now);
        assert_eq!(vec![(Sid::new(2), 200)], tracker.unsent(Epoch::new(3), 300));
    }

    #[test]
    fn silent_followers_sorted() {
        let start = Instant::now();
        let mut tracker = LeaderTracker::new(start);
        for sid in [4, 2, 3].iter() {
            tracker.record_ack(Sid::new(*sid), at(1, 64), start);
        }
        tracker.record_ack(Sid::new(3), at(1, 64), start + Duration::from_secs(2));

        let silent = tracker.silent_since(start + Duration::from_secs(4), Duration::from_secs(3));
        assert_eq!(vec![Sid::new(2), Sid::new(4)], silent);
    }
}
