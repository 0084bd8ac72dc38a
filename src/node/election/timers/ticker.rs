use crate::actor::WeakActorClient;
use crate::node::election::timers::deadline::Deadline;
use crate::node::election::timers::time::{Clock, TokioClock};
use crate::node::election::TimerTick;
use std::sync::{Arc, Weak};
use tokio::time::Duration;

/// TickerHandle keeps a periodic tick flowing into the actor. Dropping it stops the task at its
/// next wake-up.
pub(crate) struct TickerHandle<C: Clock = TokioClock> {
    _alive: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    period: Duration,
    next_tick: Deadline,
    clock: C,
}

impl<C: Clock> Shared<C> {
    fn schedule_next(&self) {
        self.next_tick.set(self.clock.now() + self.period);
    }
}

struct TickerTask<C: Clock> {
    shared: Weak<Shared<C>>,
    next_tick: Deadline,
    actor_client: WeakActorClient,
    tick: TimerTick,
    clock: C,
}

impl TickerHandle {
    /// Heartbeats fire right away so a new leader reaches its followers without waiting a full
    /// period. Election retries wait one period, since entering Searching already broadcast.
    pub(crate) fn spawn(period: Duration, fire_immediately: bool, tick: TimerTick, actor_client: WeakActorClient) -> Self {
        let (task, handle) = TickerTask::new(period, fire_immediately, tick, actor_client, TokioClock);
        tokio::task::spawn(task.run());
        handle
    }
}

impl<C: Clock> TickerTask<C> {
    fn new(
        period: Duration,
        fire_immediately: bool,
        tick: TimerTick,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, TickerHandle<C>) {
        let next_tick = Deadline::default();
        let shared = Arc::new(Shared {
            period,
            next_tick: next_tick.clone(),
            clock: clock.clone(),
        });
        if !fire_immediately {
            shared.schedule_next();
        }

        let task = TickerTask {
            shared: Arc::downgrade(&shared),
            next_tick,
            actor_client,
            tick,
            clock,
        };
        (task, TickerHandle { _alive: shared })
    }

    async fn run(mut self) {
        loop {
            if let Some(wake_at) = self.next_tick.take() {
                self.clock.sleep_until(wake_at).await;
                continue;
            }

            let shared = match self.shared.upgrade() {
                Some(shared) => shared,
                None => return,
            };
            if self.actor_client.timer_tick(self.tick).await.is_err() {
                return;
            }
            shared.schedule_next();
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

    #[tokio::test]
    async fn heartbeat_ticker_fires_first_then_every_period() {
        // -- setup --
        let period = Duration::from_millis(100);
        let tick = TimerTick::Heartbeat(Epoch::new(4));
        let (actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        // -- execute & verify --
        let (task, handle) = TickerTask::new(period, true, tick, actor_client.weak(), clock);
        let join = tokio::task::spawn(task.run());

        actor.assert_tick(tick).await;
        actor.assert_no_event().await;

        for _ in 0..4 {
            driver.advance(period);
            actor.assert_tick(tick).await;
            actor.assert_no_event().await;
        }

        // Falling far behind still yields a single tick.
        driver.advance(period * 6);
        actor.assert_tick(tick).await;
        actor.assert_no_event().await;

        drop(handle);
        driver.advance(period);
        join.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn retry_ticker_waits_one_period() {
        // -- setup --
        let period = Duration::from_millis(200);
        let tick = TimerTick::RoundRetry(Epoch::new(1));
        let (actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        // -- execute --
        let (task, _handle) = TickerTask::new(period, false, tick, actor_client.weak(), clock);
        tokio::task::spawn(task.run());

        // -- verify --
        actor.assert_no_event().await;
        driver.advance(period - Duration::from_nanos(1));
        actor.assert_no_event().await;
        driver.advance(Duration::from_nanos(1));
        actor.assert_tick(tick).await;
    }
}
