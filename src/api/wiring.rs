use crate::actor::{ActorClient, NodeActor};
use crate::api::node_handle::NodeHandle;
use crate::api::options::NodeOptionsValidated;
use crate::api::types::MemberInfo;
use crate::api::NodeEventListener;
use crate::node::{
    ClusterTracker, ElectionConfig, InvalidClusterError, PeerLinks, QuorumPeer, QuorumPeerConfig, Sid,
    VolatileLocalState,
};
use crate::route::LearnerTables;
use crate::server::{QuorumServer, RouteServer, ShutdownHandle};
use crate::store::{InMemoryByteLog, Store, StoreConfig, StoreError};
use crate::wire::{MessageRegistry, RunningMode};
use crate::NodeOptions;
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;

const ACTOR_QUEUE_SIZE: usize = 256;
// Envelopes carry the cluster name behind a u16 length prefix.
const MAX_CLUSTER_NAME_BYTES: usize = u16::MAX as usize;

pub struct NodeConfig {
    pub cluster_name: String,
    pub my_sid: u32,
    pub members: Vec<MemberInfo>,
    pub info_logger: slog::Logger,
    pub options: NodeOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("Invalid cluster info: {0}")]
    InvalidClusterInfo(#[from] InvalidClusterError),
    #[error("Invalid cluster name: {0}")]
    InvalidClusterName(String),
    #[error("Illegal options for configuring node: {0}")]
    IllegalNodeOptions(String),
    #[error("Store initialization failure")]
    StoreInitialization(#[source] StoreError),
    #[error("Failed to bind quorum port")]
    Bind(#[source] io::Error),
}

/// Starts a cluster member: the node actor, its peer links and both servers. Must be called from
/// within a tokio runtime.
///
/// The node runs until the returned handle is dropped.
pub async fn start_node(config: NodeConfig) -> Result<NodeHandle, NodeCreationError> {
    validate_cluster_name(&config.cluster_name)?;
    let options =
        NodeOptionsValidated::try_from(config.options).map_err(NodeCreationError::IllegalNodeOptions)?;
    let cluster_name = config.cluster_name;
    let my_sid = Sid::new(config.my_sid);
    let root_logger = config
        .info_logger
        .new(slog::o!("Cluster" => cluster_name.clone(), "Sid" => my_sid.to_string()));

    let members = config
        .members
        .into_iter()
        .map(|member| member.into_metadata(options.learner_weight))
        .collect();
    let cluster = ClusterTracker::create_valid_cluster(my_sid, members)?;
    let my_metadata = cluster.my_metadata().clone();

    let store = Store::open(
        InMemoryByteLog::new(),
        StoreConfig {
            cluster_name: cluster_name.clone(),
            local_sid: my_sid,
            max_sid: cluster.max_sid(),
            segment_size: options.segment_size,
            produce_mode: RunningMode::Cluster,
        },
    )
    .map_err(NodeCreationError::StoreInitialization)?;

    let registry = Arc::new(MessageRegistry::build());
    let learners = Arc::new(LearnerTables::new(options.load_balance_strategy.clone()));
    let (actor_client, actor_queue_rx) = ActorClient::new(ACTOR_QUEUE_SIZE);

    // Bind before anything is spawned, so a taken port leaves nothing running behind.
    let quorum_server = QuorumServer::bind(
        root_logger.new(slog::o!("Server" => "quorum")),
        my_metadata.quorum_addr(),
        cluster_name.clone(),
        registry.clone(),
        actor_client.weak(),
    )
    .await
    .map_err(NodeCreationError::Bind)?;

    let peer_links = PeerLinks::spawn(&root_logger, &cluster, &cluster_name, registry);

    let peer_config = QuorumPeerConfig {
        election: ElectionConfig {
            my_sid,
            heartbeat_interval: options.heartbeat_interval,
            liveness_min_timeout: options.leader_liveness_min_timeout,
            liveness_max_timeout: options.leader_liveness_max_timeout,
            round_retry_interval: options.election_retry_interval,
        },
        cluster_name: cluster_name.clone(),
        ack_window: options.leader_liveness_max_timeout,
        learner_recycle_period: options.learner_recycle_period,
        default_strategy: options.load_balance_strategy.clone(),
    };
    let (peer, election_state_change_listener) = QuorumPeer::new(
        root_logger.clone(),
        peer_config,
        cluster,
        VolatileLocalState::new(),
        store,
        learners.clone(),
        Box::new(peer_links),
        actor_client.weak(),
    );

    let node_actor = NodeActor::new(root_logger.clone(), actor_queue_rx, peer);
    tokio::spawn(node_actor.run_event_loop());

    let mut shutdown_handle = ShutdownHandle::new();
    tokio::spawn(quorum_server.run(shutdown_handle.new_signal()));

    // TODO:2 Bind the client port eagerly too, so an unavailable port fails start_node.
    let route_server = RouteServer::new(
        root_logger.new(slog::o!("Server" => "route")),
        cluster_name,
        learners,
        actor_client.weak(),
    );
    tokio::spawn(route_server.run(my_metadata.client_addr(), shutdown_handle.new_signal()));

    let event_listener = NodeEventListener::new(election_state_change_listener);

    Ok(NodeHandle::new(actor_client, event_listener, shutdown_handle))
}

fn validate_cluster_name(name: &str) -> Result<(), NodeCreationError> {
    if name.is_empty() {
        return Err(NodeCreationError::InvalidClusterName("empty".to_string()));
    }
    if name.len() > MAX_CLUSTER_NAME_BYTES {
        return Err(NodeCreationError::InvalidClusterName(format!(
            "{} bytes, at most {} allowed",
            name.len(),
            MAX_CLUSTER_NAME_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn config(cluster_name: String) -> NodeConfig {
        NodeConfig {
            cluster_name,
            my_sid: 1,
            members: vec![MemberInfo {
                sid: 1,
                ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                quorum_port: 0,
                client_port: 0,
                weight: None,
            }],
            info_logger: slog::Logger::root(slog::Discard, slog::o!()),
            options: NodeOptions::default(),
        }
    }

    #[test]
    fn cluster_names_fit_the_envelope() {
        assert!(validate_cluster_name("c1").is_ok());
        assert!(validate_cluster_name(&"x".repeat(MAX_CLUSTER_NAME_BYTES)).is_ok());
        // 2 bytes per char: within the limit in chars, over it in bytes.
        assert!(validate_cluster_name(&"é".repeat(40_000)).is_err());
        assert!(validate_cluster_name("").is_err());
    }

    #[tokio::test]
    async fn start_node_rejects_oversized_cluster_name() {
        // -- execute --
        let result = start_node(config("x".repeat(70_000))).await;

        // -- verify --
        match result {
            Err(NodeCreationError::InvalidClusterName(reason)) => assert!(reason.starts_with("70000 bytes")),
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Node started with an oversized cluster name"),
        }
    }
}
