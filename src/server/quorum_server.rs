use crate::actor::WeakActorClient;
use crate::server::ShutdownSignal;
use crate::wire::{EnvelopeCodec, MessageRegistry, WireError};
use futures::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;

/// QuorumServer accepts peer links and feeds the envelopes they carry into the node actor.
///
/// Inbound connections are read-only. Replies travel over our own outbound link to the sender.
pub(crate) struct QuorumServer {
    logger: slog::Logger,
    listener: TcpListener,
    cluster_name: String,
    registry: Arc<MessageRegistry>,
    local_node: WeakActorClient,
}

impl QuorumServer {
    /// Binds eagerly so that an unavailable port fails node creation instead of a background task.
    pub(crate) async fn bind(
        logger: slog::Logger,
        socket_addr: SocketAddr,
        cluster_name: String,
        registry: Arc<MessageRegistry>,
        local_node: WeakActorClient,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(socket_addr).await?;
        Ok(QuorumServer {
            logger,
            listener,
            cluster_name,
            registry,
            local_node,
        })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub(crate) async fn run(self, mut shutdown_signal: ShutdownSignal) {
        slog::info!(self.logger, "Listening for peers on '{:?}'", self.local_addr());

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let _ = stream.set_nodelay(true);
                        let connection = InboundConnection {
                            logger: self.logger.new(slog::o!("Remote" => remote_addr.to_string())),
                            cluster_name: self.cluster_name.clone(),
                            registry: self.registry.clone(),
                            local_node: self.local_node.clone(),
                        };
                        tokio::spawn(connection.run(stream));
                    }
                    Err(e) => slog::warn!(self.logger, "Failed to accept peer connection: {:?}", e),
                },
            }
        }

        slog::info!(self.logger, "Quorum server has exited");
    }
}

struct InboundConnection {
    logger: slog::Logger,
    cluster_name: String,
    registry: Arc<MessageRegistry>,
    local_node: WeakActorClient,
}

impl InboundConnection {
    async fn run(self, stream: TcpStream) {
        let mut frames = FramedRead::new(stream, EnvelopeCodec::new(self.registry.clone()));

        while let Some(frame) = frames.next().await {
            let envelope = match frame {
                Ok(envelope) => envelope,
                // The frame was consumed in full, so the stream is still aligned on the next one.
                Err(WireError::Decode(e)) => {
                    slog::warn!(self.logger, "Dropping malformed envelope: {}", e);
                    continue;
                }
                Err(WireError::Io(e)) => {
                    slog::info!(self.logger, "Peer connection closed: {}", e);
                    break;
                }
            };

            if envelope.cluster_name != self.cluster_name {
                slog::warn!(
                    self.logger,
                    "Dropping envelope for foreign cluster '{}'",
                    envelope.cluster_name
                );
                continue;
            }

            slog::trace!(self.logger, "PeerWire - {:?}", envelope.message);
            if self.local_node.inbound(envelope.message).await.is_err() {
                break;
            }
        }
    }
}
