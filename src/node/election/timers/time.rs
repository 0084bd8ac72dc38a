use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Clock is the timers' only source of time, so tests can drive them by hand.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    async fn sleep_until(&mut self, deadline: Instant);

    async fn sleep(&mut self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) fn manual_clock() -> (ManualClock, ManualClockDriver) {
    let start = Instant::now();
    let (tx, rx) = watch::channel(start);
    (ManualClock { now: rx }, ManualClockDriver { now: tx, start })
}

/// ManualClock only moves when its driver says so.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.now.borrow() < deadline {
            if self.now.changed().await.is_err() {
                // Driver is gone, time will never move again.
                futures::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct ManualClockDriver {
    now: watch::Sender<Instant>,
    start: Instant,
}

#[cfg(test)]
impl ManualClockDriver {
    pub(crate) fn now(&self) -> Instant {
        *self.now.borrow()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.now() - self.start
    }

    /// Move time forward. Sleepers wake at or after their deadline, never before, so keep steps
    /// smaller than the granularity under test.
    pub(crate) fn advance(&mut self, step: Duration) {
        let next = self.now() + step;
        let _ = self.now.send(next);
    }
}
