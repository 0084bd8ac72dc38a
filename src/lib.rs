mod actor;
mod api;
mod node;
mod route;
mod server;
mod store;
mod wire;
mod grpc {
    include!("../generated/route.rs");
}

pub use api::start_node;
pub use api::ClientError;
pub use api::ElectionEvent;
pub use api::MemberInfo;
pub use api::NodeConfig;
pub use api::NodeCreationError;
pub use api::NodeEvent;
pub use api::NodeEventListener;
pub use api::NodeHandle;
pub use api::NodeOptions;
pub use api::RouteClient;
pub use api::RouteClientConfig;
pub use api::RouteHeartbeatHandle;
pub use node::{Epoch, IncrementError, InvalidClusterError, LeaderInfo, Sid};
pub use route::{
    parse_bootstrap, BalancerRegistry, BalancerSettings, ConsistentHashBalancer, InvalidInvokerError, Invoker,
    LearnerTables, LoadBalance, RandomBalancer, RoundRobinBalancer, RouteInfo, Router, RouterError, CONSISTENT_HASH,
    RANDOM, ROUND_ROBIN,
};
pub use store::{
    cluster_mbid, Applied, ByteLog, ComponentRecord, InMemoryByteLog, LogPosition, RecordBatch, RecordDecodeError,
    RecordStatus, Store, StoreConfig, StoreError, StoreHeader, HEADER_SIZE, INITIAL_OFFSET, RECORD_FIXED_SIZE,
};
pub use wire::{
    Ballot, DecodeError, Envelope, EnvelopeCodec, MessageKind, MessageRegistry, Proposal, QuorumMessage, Refuse,
    RunningMode, Sync, Vote, VoterState, WireError, PROTOCOL_VERSION,
};

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. No `mod` is `pub`; types
// are exported individually so each root mod stays free to organize its internals.
