use crate::grpc::route_discovery_client::RouteDiscoveryClient;
use crate::grpc::{
    proto_increment_error, proto_increment_result, ProtoComponentRecord, ProtoHeartbeatReq, ProtoIncrementReq,
    ProtoIncrementResult, ProtoRouteInfo,
};
use crate::node::Sid;
use crate::route::{BalancerRegistry, Invoker, RouteInfo, Router, RouterError, ROUND_ROBIN};
use crate::server::{ShutdownHandle, ShutdownSignal};
use crate::store::{ComponentRecord, RecordStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::error::Elapsed;
use tokio::time::Duration;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

// Pause before retrying while the cluster has no leader.
const NO_LEADER_BACKOFF: Duration = Duration::from_millis(100);

pub struct RouteClientConfig {
    pub cluster_name: String,
    /// Comma-separated `host:port` list of client addresses to try while no route is known.
    pub bootstrap: String,
    /// Strategy used until the cluster advertises one. Default `roundrobin`.
    pub strategy: Option<String>,
    /// Per-call timeout, connection included. Default 1s.
    pub request_timeout: Option<Duration>,
    pub info_logger: slog::Logger,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No node answered within {attempts} attempts")]
    NoReachableNode { attempts: usize },
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Invalid client config: {0}")]
    InvalidConfig(#[from] RouterError),
}

/// RouteClient discovers the cluster's maintainer and learners through route heartbeats and sends
/// increments to the maintainer. Clones share the same route view.
#[derive(Clone)]
pub struct RouteClient {
    inner: Arc<RouteClientInner>,
}

struct RouteClientInner {
    logger: slog::Logger,
    cluster_name: String,
    request_timeout: Duration,
    router: Mutex<Router>,
}

/// Stops the background route refresh when dropped.
pub struct RouteHeartbeatHandle {
    _shutdown_handle: ShutdownHandle,
}

// Failure to reach a node at all, as opposed to a node answering with an error.
#[derive(Debug)]
enum CallError {
    InvalidUri(uri::InvalidUri),
    Transport(tonic::transport::Error),
    Status(Status),
    Timeout,
}

impl From<uri::InvalidUri> for CallError {
    fn from(e: uri::InvalidUri) -> Self {
        CallError::InvalidUri(e)
    }
}

impl From<tonic::transport::Error> for CallError {
    fn from(e: tonic::transport::Error) -> Self {
        CallError::Transport(e)
    }
}

impl From<Status> for CallError {
    fn from(e: Status) -> Self {
        CallError::Status(e)
    }
}

impl From<Elapsed> for CallError {
    fn from(_: Elapsed) -> Self {
        CallError::Timeout
    }
}

enum IncrementReply {
    Committed(ComponentRecord),
    Redirect(String),
    NoLeader,
    Rejected(String),
    ServerFault(String),
}

impl RouteClient {
    pub fn new(config: RouteClientConfig) -> Result<Self, ClientError> {
        let strategy = config.strategy.unwrap_or_else(|| ROUND_ROBIN.to_string());
        let router = Router::new(BalancerRegistry::build(), &config.bootstrap, &strategy)?;

        Ok(RouteClient {
            inner: Arc::new(RouteClientInner {
                logger: config
                    .info_logger
                    .new(slog::o!("Cluster" => config.cluster_name.clone())),
                cluster_name: config.cluster_name,
                request_timeout: config.request_timeout.unwrap_or(Duration::from_secs(1)),
                router: Mutex::new(router),
            }),
        })
    }

    /// Client address of the node currently believed to be leader.
    pub fn maintainer(&self) -> Option<String> {
        self.router().maintainer().map(str::to_string)
    }

    pub fn learners(&self) -> Vec<Invoker> {
        self.router().invokers().to_vec()
    }

    /// Picks a learner for `key` with the current strategy, or the maintainer when no learners
    /// are known.
    pub fn select(&self, key: Option<&str>) -> Option<String> {
        self.router().select(key)
    }

    /// Heartbeats the maintainer, then one load-balanced learner, then the bootstrap addresses in
    /// turn, until a node answers or `retry_budget` calls have failed.
    pub async fn refresh_route(&self, retry_budget: usize) -> Result<RouteInfo, ClientError> {
        let mut tried_learner = false;

        for _ in 0..retry_budget {
            let (target, is_maintainer) = {
                let mut router = self.router();
                let maintainer = router.maintainer().map(str::to_string);
                match maintainer {
                    Some(maintainer) => (maintainer, true),
                    None if !tried_learner && !router.invokers().is_empty() => {
                        tried_learner = true;
                        let learner = router.select(None);
                        (learner.unwrap_or_else(|| router.next_bootstrap()), false)
                    }
                    None => (router.next_bootstrap(), false),
                }
            };

            match self.call_heartbeat(&target).await {
                Ok(proto_route) => {
                    let route = convert_route_info(&self.inner.logger, proto_route);
                    if let Err(e) = self.router().update(&route) {
                        slog::warn!(self.inner.logger, "Keeping current strategy: {}", e);
                    }
                    slog::debug!(self.inner.logger, "Route from {}: {:?}", target, route);
                    return Ok(route);
                }
                Err(e) => {
                    slog::debug!(self.inner.logger, "Heartbeat to {} failed: {:?}", target, e);
                    if is_maintainer {
                        self.router().forget_maintainer();
                    }
                }
            }
        }

        Err(ClientError::NoReachableNode {
            attempts: retry_budget,
        })
    }

    /// Sends an increment to the maintainer, following leader redirects. Every call, route
    /// refreshes included, counts against `retry_budget`.
    pub async fn increment(&self, key: &str, value: &str, retry_budget: usize) -> Result<ComponentRecord, ClientError> {
        let mut redirect: Option<String> = None;
        let mut attempts = 0;

        while attempts < retry_budget {
            let target = match redirect.take().or_else(|| self.maintainer()) {
                Some(target) => target,
                None => {
                    attempts += 1;
                    if let Err(e) = self.refresh_route(1).await {
                        slog::debug!(self.inner.logger, "No route yet: {}", e);
                    } else if self.maintainer().is_none() {
                        tokio::time::sleep(NO_LEADER_BACKOFF).await;
                    }
                    continue;
                }
            };

            attempts += 1;
            match self.call_increment(&target, key, value).await {
                Ok(IncrementReply::Committed(record)) => return Ok(record),
                Ok(IncrementReply::Rejected(message)) => return Err(ClientError::Rejected(message)),
                Ok(IncrementReply::Redirect(leader_addr)) => {
                    slog::debug!(self.inner.logger, "{} redirected us to {}", target, leader_addr);
                    redirect = Some(leader_addr);
                }
                Ok(IncrementReply::NoLeader) => {
                    self.router().forget_maintainer();
                    tokio::time::sleep(NO_LEADER_BACKOFF).await;
                }
                Ok(IncrementReply::ServerFault(message)) => {
                    slog::warn!(self.inner.logger, "Server fault from {}: {}", target, message);
                    self.router().forget_maintainer();
                }
                Err(e) => {
                    slog::debug!(self.inner.logger, "Increment to {} failed: {:?}", target, e);
                    self.router().forget_maintainer();
                }
            }
        }

        Err(ClientError::NoReachableNode { attempts })
    }

    /// Refreshes the route every `interval` in the background until the handle is dropped.
    pub fn spawn_heartbeat(&self, interval: Duration) -> RouteHeartbeatHandle {
        let mut shutdown_handle = ShutdownHandle::new();
        tokio::spawn(Self::run_heartbeat(self.clone(), interval, shutdown_handle.new_signal()));

        RouteHeartbeatHandle {
            _shutdown_handle: shutdown_handle,
        }
    }

    async fn run_heartbeat(client: RouteClient, interval: Duration, mut shutdown_signal: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = &mut shutdown_signal => break,
                _ = ticker.tick() => {
                    if let Err(e) = client.refresh_route(1).await {
                        slog::debug!(client.inner.logger, "Periodic route refresh failed: {}", e);
                    }
                }
            }
        }
    }

    fn router(&self) -> MutexGuard<'_, Router> {
        // Router methods don't panic, recover the value regardless.
        self.inner.router.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn connect(&self, address: &str) -> Result<RouteDiscoveryClient<Channel>, CallError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", address))?.timeout(self.inner.request_timeout);
        let connection = tokio::time::timeout(self.inner.request_timeout, endpoint.connect()).await??;
        Ok(RouteDiscoveryClient::new(connection))
    }

    async fn call_heartbeat(&self, address: &str) -> Result<ProtoRouteInfo, CallError> {
        let mut client = self.connect(address).await?;
        let rpc_request = ProtoHeartbeatReq {
            cluster_name: self.inner.cluster_name.clone(),
        };

        slog::trace!(self.inner.logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(self.inner.request_timeout, client.heartbeat(rpc_request)).await??;
        slog::trace!(self.inner.logger, "ClientWire - {:?}", rpc_reply);

        Ok(rpc_reply.into_inner())
    }

    async fn call_increment(&self, address: &str, key: &str, value: &str) -> Result<IncrementReply, CallError> {
        let mut client = self.connect(address).await?;
        let rpc_request = ProtoIncrementReq {
            cluster_name: self.inner.cluster_name.clone(),
            key: key.to_string(),
            value: value.to_string(),
        };

        slog::debug!(self.inner.logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(self.inner.request_timeout, client.increment(rpc_request)).await??;
        slog::debug!(self.inner.logger, "ClientWire - {:?}", rpc_reply);

        Ok(convert_increment_result(rpc_reply.into_inner()))
    }
}

fn convert_route_info(logger: &slog::Logger, proto_route: ProtoRouteInfo) -> RouteInfo {
    let mut route = RouteInfo::new(proto_route.strategy);
    if !proto_route.maintainer.is_empty() {
        route.maintainer = Some(proto_route.maintainer);
    }
    for learner in proto_route.learners {
        match Invoker::new(learner.address, learner.weight) {
            Ok(invoker) => {
                route.learners.insert(Sid::new(learner.sid), invoker);
            }
            Err(e) => slog::warn!(logger, "Skipping learner {}: {}", learner.sid, e),
        }
    }
    route
}

fn convert_increment_result(rpc_result: ProtoIncrementResult) -> IncrementReply {
    match rpc_result.result {
        Some(proto_increment_result::Result::Ok(record)) => IncrementReply::Committed(convert_record(record)),
        Some(proto_increment_result::Result::Err(err)) => match err.err {
            Some(proto_increment_error::Err::NotLeader(leader)) => IncrementReply::Redirect(leader.leader_addr),
            Some(proto_increment_error::Err::NoLeader(_)) => IncrementReply::NoLeader,
            Some(proto_increment_error::Err::Rejected(payload)) => IncrementReply::Rejected(payload.message),
            Some(proto_increment_error::Err::ServerFault(payload)) => IncrementReply::ServerFault(payload.message),
            None => IncrementReply::ServerFault("Malformed Increment Err".into()),
        },
        None => IncrementReply::ServerFault("Malformed Increment Result".into()),
    }
}

fn convert_record(record: ProtoComponentRecord) -> ComponentRecord {
    ComponentRecord {
        create_timestamp: record.create_timestamp,
        update_timestamp: record.update_timestamp,
        physical_offset: record.physical_offset,
        incr: record.incr,
        status: RecordStatus::Active,
        key: record.key,
        value: record.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::{ProtoLearner, ProtoNotLeader};

    fn client(bootstrap: &str) -> RouteClient {
        RouteClient::new(RouteClientConfig {
            cluster_name: "c1".to_string(),
            bootstrap: bootstrap.to_string(),
            strategy: None,
            request_timeout: Some(Duration::from_millis(200)),
            info_logger: slog::Logger::root(slog::Discard, slog::o!()),
        })
        .unwrap()
    }

    #[test]
    fn rejects_empty_bootstrap() {
        let result = RouteClient::new(RouteClientConfig {
            cluster_name: "c1".to_string(),
            bootstrap: " , ".to_string(),
            strategy: None,
            request_timeout: None,
            info_logger: slog::Logger::root(slog::Discard, slog::o!()),
        });
        assert!(matches!(
            result,
            Err(ClientError::InvalidConfig(RouterError::EmptyBootstrap))
        ));
    }

    #[test]
    fn route_info_drops_blank_maintainer_and_bad_learners() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let proto_route = ProtoRouteInfo {
            maintainer: String::new(),
            learners: vec![
                ProtoLearner {
                    sid: 1,
                    address: "127.0.0.1:8001".to_string(),
                    weight: 2,
                },
                ProtoLearner {
                    sid: 2,
                    address: String::new(),
                    weight: 1,
                },
            ],
            strategy: "random".to_string(),
        };

        let route = convert_route_info(&logger, proto_route);

        assert_eq!(None, route.maintainer);
        assert_eq!("random", route.strategy);
        assert_eq!(vec![Invoker::new("127.0.0.1:8001", 2).unwrap()], route.invokers());
    }

    #[test]
    fn not_leader_becomes_redirect() {
        let rpc_result = ProtoIncrementResult {
            result: Some(proto_increment_result::Result::Err(crate::grpc::ProtoIncrementError {
                err: Some(proto_increment_error::Err::NotLeader(ProtoNotLeader {
                    leader_sid: 3,
                    leader_addr: "127.0.0.1:8003".to_string(),
                })),
            })),
        };

        match convert_increment_result(rpc_result) {
            IncrementReply::Redirect(address) => assert_eq!("127.0.0.1:8003", address),
            _ => panic!("Expected redirect"),
        }
    }

    #[tokio::test]
    async fn unreachable_bootstrap_exhausts_budget() {
        // Port 1 on localhost refuses connections.
        let client = client("127.0.0.1:1,127.0.0.1:2");

        match client.refresh_route(3).await {
            Err(ClientError::NoReachableNode { attempts }) => assert_eq!(3, attempts),
            other => panic!("Unexpected {:?}", other),
        }
        match client.increment("order", "ORD-#incr", 2).await {
            Err(ClientError::NoReachableNode { attempts }) => assert_eq!(2, attempts),
            other => panic!("Unexpected {:?}", other),
        }
        assert_eq!(None, client.maintainer());
    }
}
