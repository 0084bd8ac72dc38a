use crate::node::Sid;
use std::net::SocketAddr;
use tokio::sync::watch;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaderInfo {
    pub sid: Sid,
    /// Where clients reach the leader's route discovery service.
    pub client_addr: SocketAddr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElectionStateSnapshot {
    Searching,
    Following(LeaderInfo),
    Leading,
}

pub(super) fn new(initial: ElectionStateSnapshot) -> (ElectionStateChangeNotifier, ElectionStateChangeListener) {
    let (tx, rx) = watch::channel(initial);
    (ElectionStateChangeNotifier { tx }, ElectionStateChangeListener { rx })
}

pub(super) struct ElectionStateChangeNotifier {
    tx: watch::Sender<ElectionStateSnapshot>,
}

impl ElectionStateChangeNotifier {
    /// Publishes `snapshot` unless listeners already have it.
    pub(super) fn notify(&self, snapshot: ElectionStateSnapshot) {
        if *self.tx.borrow() == snapshot {
            return;
        }
        // Nobody listening is fine.
        let _ = self.tx.send(snapshot);
    }
}

#[derive(Clone)]
pub(crate) struct ElectionStateChangeListener {
    rx: watch::Receiver<ElectionStateSnapshot>,
}

impl ElectionStateChangeListener {
    /// Waits for the next change. `None` once the node actor is gone.
    pub(crate) async fn next(&mut self) -> Option<ElectionStateSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow().clone())
    }

    pub(crate) fn current(&self) -> ElectionStateSnapshot {
        self.rx.borrow().clone()
    }
}
