use crate::node::outbox::Outbox;
use crate::node::peers::ClusterTracker;
use crate::node::Sid;
use crate::wire::{Envelope, EnvelopeCodec, MessageRegistry, QuorumMessage, RunningMode};
use futures::SinkExt;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Duration;
use tokio_util::codec::FramedWrite;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// PeerLinks owns one outbound link per peer. Dropping it closes every link.
pub(crate) struct PeerLinks {
    links: HashMap<Sid, mpsc::UnboundedSender<QuorumMessage>>,
}

impl PeerLinks {
    pub(crate) fn spawn(
        logger: &slog::Logger,
        cluster: &ClusterTracker,
        cluster_name: &str,
        registry: Arc<MessageRegistry>,
    ) -> Self {
        let mut links = HashMap::new();
        for peer in cluster.iter_peers() {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = PeerLinkTask {
                logger: logger.new(slog::o!("Peer" => peer.sid().to_string())),
                addr: peer.quorum_addr(),
                cluster_name: cluster_name.to_string(),
                registry: registry.clone(),
                outgoing: rx,
            };
            tokio::task::spawn(task.run());
            links.insert(peer.sid(), tx);
        }

        PeerLinks { links }
    }
}

impl Outbox for PeerLinks {
    fn send(&self, to: Sid, message: QuorumMessage) {
        if let Some(link) = self.links.get(&to) {
            // Only fails once the link task has exited, which only happens when we're shutting down.
            let _ = link.send(message);
        }
    }
}

struct PeerLinkTask {
    logger: slog::Logger,
    addr: SocketAddr,
    cluster_name: String,
    registry: Arc<MessageRegistry>,
    outgoing: mpsc::UnboundedReceiver<QuorumMessage>,
}

enum LinkState {
    Reconnect,
    Closed,
}

impl PeerLinkTask {
    async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect(self.addr).await {
                Ok(stream) => {
                    backoff = INITIAL_BACKOFF;
                    let _ = stream.set_nodelay(true);
                    slog::info!(self.logger, "Connected to {}", self.addr);
                    if let LinkState::Closed = self.pump(stream).await {
                        return;
                    }
                }
                Err(e) => {
                    slog::debug!(self.logger, "Connect to {} failed: {:?}. Retrying in {:?}", self.addr, e, backoff);
                }
            }

            // Whatever queued up while the peer was unreachable is stale by the time it comes back.
            if let LinkState::Closed = self.discard_backlog() {
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn pump(&mut self, stream: TcpStream) -> LinkState {
        let connection_id = rand::thread_rng().gen::<u64>();
        let mut frames = FramedWrite::new(stream, EnvelopeCodec::new(self.registry.clone()));

        while let Some(message) = self.outgoing.recv().await {
            let envelope = Envelope::new(self.cluster_name.clone(), RunningMode::Cluster, connection_id, message);
            if let Err(e) = frames.send(envelope).await {
                slog::warn!(self.logger, "Link to {} broke: {:?}", self.addr, e);
                return LinkState::Reconnect;
            }
        }

        LinkState::Closed
    }

    fn discard_backlog(&mut self) -> LinkState {
        let mut discarded = 0;
        loop {
            match self.outgoing.try_recv() {
                Ok(_) => discarded += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return LinkState::Closed,
            }
        }
        if discarded > 0 {
            slog::debug!(self.logger, "Discarded {} messages for unreachable {}", discarded, self.addr);
        }
        LinkState::Reconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::peers::MemberMetadata;
    use crate::node::Epoch;
    use crate::store::LogPosition;
    use crate::wire::Proposal;
    use futures::StreamExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    fn heartbeat(offset: u64) -> QuorumMessage {
        let position = LogPosition::new(Epoch::new(1), offset);
        QuorumMessage::Proposal(Proposal::heartbeat(Sid::new(1), Epoch::new(1), position))
    }

    #[tokio::test]
    async fn delivers_envelopes_to_peer() {
        // -- setup --
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = listener.local_addr().unwrap();
        let unused: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let cluster = ClusterTracker::create_valid_cluster(
            Sid::new(1),
            vec![
                MemberMetadata::new(Sid::new(1), unused, unused, 1),
                MemberMetadata::new(Sid::new(2), peer_addr, unused, 1),
            ],
        )
        .unwrap();
        let registry = Arc::new(MessageRegistry::build());
        let logger = slog::Logger::root(slog::Discard, slog::o!());

        // -- execute --
        let links = PeerLinks::spawn(&logger, &cluster, "c1", registry.clone());
        let (stream, _) = listener.accept().await.unwrap();
        for offset in 0..3 {
            links.send(Sid::new(2), heartbeat(offset));
        }
        // Unknown peers are ignored.
        links.send(Sid::new(7), heartbeat(9));

        // -- verify --
        let mut frames = FramedRead::new(stream, EnvelopeCodec::new(registry));
        let mut connection_ids = Vec::new();
        for offset in 0..3 {
            let envelope = frames.next().await.unwrap().unwrap();
            assert_eq!("c1", envelope.cluster_name);
            assert_eq!(
                heartbeat(offset),
                envelope.message
            );
            connection_ids.push(envelope.connection_id);
        }
        connection_ids.dedup();
        assert_eq!(1, connection_ids.len());

        // Dropping the links closes the connection.
        drop(links);
        assert!(frames.next().await.is_none());
    }
}
