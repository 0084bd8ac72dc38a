use crate::actor::Event;
use crate::node::election::TimerTick;
use std::time::Duration;
use tokio::sync::mpsc;

/// TestUtilActor stands in for the node actor and asserts on what the timers enqueue.
pub(super) struct TestUtilActor {
    rx: mpsc::Receiver<Event>,
    quiet_period: Duration,
}

impl TestUtilActor {
    pub(super) fn new(rx: mpsc::Receiver<Event>) -> Self {
        TestUtilActor {
            rx,
            quiet_period: Duration::from_millis(10),
        }
    }

    pub(super) async fn assert_tick(&mut self, expected: TimerTick) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Timed out waiting for a tick")
            .expect("Actor queue closed");
        match event {
            Event::Timer(tick) => assert_eq!(expected, tick),
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_no_event(&mut self) {
        if let Ok(event) = tokio::time::timeout(self.quiet_period, self.rx.recv()).await {
            panic!("Expected no event, got {:?}", event);
        }
    }
}
