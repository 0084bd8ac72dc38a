use crate::node::{self, IncrementError, IncrementInput, RemoveInput, TimerTick, WriteOutput};
use crate::store::{ByteLog, ComponentRecord};
use crate::wire::QuorumMessage;
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

// Every node's protocol and storage state lives in one actor. Handlers are synchronous, store I/O
// included, so events are applied strictly in arrival order.
#[derive(Debug)]
pub(crate) enum Event {
    // Searching: tally votes, maybe conclude the round.
    // Following/Leading: answer searching voters with our established vote.
    // Leading: register followers that ack and answer them with a Sync.
    // Following: track leader liveness, apply Syncs.
    Inbound(QuorumMessage),

    // Leading: append a record, respond once a quorum holds it.
    // Following: redirect to leader.
    // Searching: reject, no leader.
    Increment(IncrementInput, Callback<WriteOutput, IncrementError>),
    Remove(RemoveInput, Callback<WriteOutput, IncrementError>),

    // Any state: read the local replica.
    Lookup(String, Callback<Option<ComponentRecord>, ActorExited>),

    // Election timers. Ticks from a stage we already left are discarded.
    Timer(TimerTick),
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Result<O, E>>) {
        let (tx, rx) = oneshot::channel();
        (Callback(tx), rx)
    }

    pub(crate) fn send(self, result: Result<O, E>) {
        // Caller may have given up waiting.
        let _ = self.0.send(result);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Node actor has exited")]
pub(crate) struct ActorExited;

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: tx }, rx)
    }

    /// Weak clients don't keep the actor alive. Timers and servers hold these, so the actor
    /// exits once the node handle is gone.
    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn increment(&self, input: IncrementInput) -> Result<WriteOutput, IncrementError> {
        let (callback, rx) = Callback::channel();
        self.send(Event::Increment(input, callback))
            .await
            .map_err(|_| IncrementError::ActorExited)?;
        rx.await.map_err(|_| IncrementError::ActorExited)?
    }

    pub(crate) async fn remove(&self, input: RemoveInput) -> Result<WriteOutput, IncrementError> {
        let (callback, rx) = Callback::channel();
        self.send(Event::Remove(input, callback))
            .await
            .map_err(|_| IncrementError::ActorExited)?;
        rx.await.map_err(|_| IncrementError::ActorExited)?
    }

    pub(crate) async fn lookup(&self, key: String) -> Result<Option<ComponentRecord>, ActorExited> {
        let (callback, rx) = Callback::channel();
        self.send(Event::Lookup(key, callback)).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) fn upgrade(&self) -> Option<ActorClient> {
        self.sender.upgrade().map(|sender| ActorClient { sender })
    }

    pub(crate) async fn inbound(&self, message: QuorumMessage) -> Result<(), ActorExited> {
        self.send(Event::Inbound(message)).await
    }

    pub(crate) async fn timer_tick(&self, tick: TimerTick) -> Result<(), ActorExited> {
        self.send(Event::Timer(tick)).await
    }

    pub(crate) async fn increment(&self, input: IncrementInput) -> Result<WriteOutput, IncrementError> {
        match self.upgrade() {
            Some(client) => client.increment(input).await,
            None => Err(IncrementError::ActorExited),
        }
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        match self.upgrade() {
            Some(client) => client.send(event).await,
            None => Err(ActorExited),
        }
    }
}

/// NodeActor runs a quorum peer as an actor.
pub(crate) struct NodeActor<L: ByteLog, S: node::PersistentLocalState> {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    peer: node::QuorumPeer<L, S>,
}

impl<L: ByteLog, S: node::PersistentLocalState> NodeActor<L, S> {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, peer: node::QuorumPeer<L, S>) -> Self {
        NodeActor { logger, receiver, peer }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
        }
        slog::info!(self.logger, "Node actor event loop has exited");
    }

    // Must NOT be async.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Inbound(message) => self.peer.handle_message(message),
            Event::Increment(input, callback) => self.peer.handle_increment(input, callback),
            Event::Remove(input, callback) => self.peer.handle_remove(input, callback),
            Event::Lookup(key, callback) => callback.send(Ok(self.peer.lookup(&key))),
            Event::Timer(tick) => self.peer.handle_timer(tick),
        }
    }
}
