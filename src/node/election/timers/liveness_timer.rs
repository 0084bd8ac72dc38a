use crate::actor::WeakActorClient;
use crate::node::election::timers::deadline::Deadline;
use crate::node::election::timers::time::{Clock, TokioClock};
use crate::node::election::TimerTick;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use tokio::time::{Duration, Instant};

/// LivenessTimerHandle watches the leader on behalf of a follower. Every Proposal or Sync from
/// the leader pushes the deadline out by a random timeout; once the deadline passes unmoved,
/// the actor gets a `LeaderSilent` tick.
pub(crate) struct LivenessTimerHandle<C: Clock = TokioClock> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    timeout_range: RangeInclusive<Duration>,
    deadline: Deadline,
    clock: C,
}

impl<C: Clock> Shared<C> {
    fn random_deadline(&self) -> Instant {
        let timeout = rand::thread_rng().gen_range(self.timeout_range.clone());
        self.clock.now() + timeout
    }
}

struct LivenessTimerTask<C: Clock> {
    shared: Weak<Shared<C>>,
    deadline: Deadline,
    actor_client: WeakActorClient,
    tick: TimerTick,
    clock: C,
    // Pause between repeated timeouts while the actor has not yet left Following.
    backoff: Duration,
}

impl LivenessTimerHandle {
    pub(crate) fn spawn(min_timeout: Duration, max_timeout: Duration, tick: TimerTick, actor_client: WeakActorClient) -> Self {
        let (task, handle) = LivenessTimerTask::new(min_timeout, max_timeout, tick, actor_client, TokioClock);
        tokio::task::spawn(task.run());
        handle
    }
}

impl<C: Clock> LivenessTimerHandle<C> {
    pub(crate) fn leader_seen(&self) {
        self.shared.deadline.set(self.shared.random_deadline());
    }
}

impl<C: Clock> LivenessTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        tick: TimerTick,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, LivenessTimerHandle<C>) {
        let deadline = Deadline::default();
        let shared = Arc::new(Shared {
            timeout_range: min_timeout..=max_timeout,
            deadline: deadline.clone(),
            clock: clock.clone(),
        });
        let task = LivenessTimerTask {
            shared: Arc::downgrade(&shared),
            deadline,
            actor_client,
            tick,
            clock,
            backoff: min_timeout,
        };
        let handle = LivenessTimerHandle { shared };

        // Start armed, a fresh follower gets a full timeout to hear from its leader.
        handle.leader_seen();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            match self.deadline.take() {
                Some(wake_at) => self.clock.sleep_until(wake_at).await,
                None => {
                    if self.shared.upgrade().is_none() {
                        return;
                    }
                    if self.actor_client.timer_tick(self.tick).await.is_err() {
                        return;
                    }
                    self.clock.sleep(self.backoff).await;
                }
            }

            if self.shared.upgrade().is_none() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::node::election::timers::test_utils::TestUtilActor;
    use crate::node::election::timers::time;
    use crate::node::Epoch;

    const TICK: TimerTick = TimerTick::LeaderSilent(Epoch::new(5));

    #[tokio::test]
    async fn leader_seen_postpones_timeout() {
        // -- setup --
        let timeout = Duration::from_millis(500);
        let (actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        // No jitter, min and max are the same.
        let (task, handle) = LivenessTimerTask::new(timeout, timeout, TICK, actor_client.weak(), clock);
        tokio::task::spawn(task.run());
        actor.assert_no_event().await;

        // -- execute & verify --
        for _ in 0..6 {
            driver.advance(timeout / 2);
            handle.leader_seen();
        }
        actor.assert_no_event().await;
        assert_eq!(timeout * 3, driver.elapsed());

        // Last sighting was at 3.0 timeouts, so nothing fires before 4.0.
        driver.advance(timeout - Duration::from_nanos(1));
        actor.assert_no_event().await;
        driver.advance(Duration::from_nanos(1));
        actor.assert_tick(TICK).await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_task() {
        // -- setup --
        let timeout = Duration::from_millis(500);
        let (actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();
        let (task, handle) = LivenessTimerTask::new(timeout, timeout, TICK, actor_client.weak(), clock);
        let join = tokio::task::spawn(task.run());

        // -- execute --
        drop(handle);
        driver.advance(timeout * 2);

        // -- verify --
        join.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn keeps_running_after_timeout_until_dropped() {
        // -- setup --
        let timeout = Duration::from_millis(500);
        let (actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();
        let (task, handle) = LivenessTimerTask::new(timeout, timeout, TICK, actor_client.weak(), clock);
        tokio::task::spawn(task.run());

        // -- execute --
        // A Sync can already sit in the actor queue when the timeout fires, so the handle may be
        // poked after the tick went out.
        driver.advance(timeout);
        actor.assert_tick(TICK).await;
        handle.leader_seen();

        // -- verify --
        for _ in 0..4 {
            driver.advance(timeout / 2);
            handle.leader_seen();
        }
        actor.assert_no_event().await;
    }
}
