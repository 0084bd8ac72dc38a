use crate::actor::WeakActorClient;
use crate::grpc::route_discovery_server::{RouteDiscovery, RouteDiscoveryServer};
use crate::grpc::{
    proto_increment_error, proto_increment_result, ProtoComponentRecord, ProtoHeartbeatReq, ProtoIncrementError,
    ProtoIncrementReq, ProtoIncrementResult, ProtoLearner, ProtoNoLeader, ProtoNotLeader, ProtoRejected,
    ProtoRouteInfo, ProtoServerFault,
};
use crate::node::{IncrementError, IncrementInput, WriteOutput};
use crate::route::{LearnerTables, RouteInfo};
use crate::server::ShutdownSignal;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RouteServer answers route discovery heartbeats and increment requests from clients.
pub(crate) struct RouteServer {
    logger: slog::Logger,
    cluster_name: String,
    learners: Arc<LearnerTables>,
    local_node: WeakActorClient,
}

impl RouteServer {
    pub(crate) fn new(
        logger: slog::Logger,
        cluster_name: String,
        learners: Arc<LearnerTables>,
        local_node: WeakActorClient,
    ) -> Self {
        RouteServer {
            logger,
            cluster_name,
            learners,
            local_node,
        }
    }

    pub(crate) async fn run(self, socket_addr: SocketAddr, shutdown_signal: ShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening for clients on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(RouteDiscoveryServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Route server run() has exited: {:?}", result);
    }

    fn check_cluster(&self, cluster_name: &str) -> Result<(), Status> {
        if cluster_name == self.cluster_name {
            Ok(())
        } else {
            Err(Status::failed_precondition(format!(
                "Node serves cluster '{}', not '{}'",
                self.cluster_name, cluster_name
            )))
        }
    }

    fn handle_heartbeat(&self, rpc_request: ProtoHeartbeatReq) -> Result<ProtoRouteInfo, Status> {
        self.check_cluster(&rpc_request.cluster_name)?;
        let route = self.learners.route_info(&self.cluster_name);
        Ok(Self::convert_route_info(&route))
    }

    async fn handle_increment(&self, rpc_request: ProtoIncrementReq) -> Result<ProtoIncrementResult, Status> {
        self.check_cluster(&rpc_request.cluster_name)?;
        let app_input = IncrementInput {
            key: rpc_request.key,
            value: rpc_request.value,
        };
        let app_result = self.local_node.increment(app_input).await;
        Ok(Self::convert_increment_result(app_result))
    }

    fn convert_route_info(route: &RouteInfo) -> ProtoRouteInfo {
        ProtoRouteInfo {
            maintainer: route.maintainer.clone().unwrap_or_default(),
            learners: route
                .learners
                .iter()
                .map(|(sid, invoker)| ProtoLearner {
                    sid: sid.as_u32(),
                    address: invoker.address().to_string(),
                    weight: invoker.weight(),
                })
                .collect(),
            strategy: route.strategy.clone(),
        }
    }

    fn convert_increment_result(app_result: Result<WriteOutput, IncrementError>) -> ProtoIncrementResult {
        let result = match app_result {
            Ok(WriteOutput { record }) => proto_increment_result::Result::Ok(ProtoComponentRecord {
                create_timestamp: record.create_timestamp,
                update_timestamp: record.update_timestamp,
                physical_offset: record.physical_offset,
                incr: record.incr,
                key: record.key,
                value: record.value,
            }),
            Err(e) => {
                let err = match e {
                    IncrementError::NotLeader(leader) => proto_increment_error::Err::NotLeader(ProtoNotLeader {
                        leader_sid: leader.sid.as_u32(),
                        leader_addr: leader.client_addr.to_string(),
                    }),
                    IncrementError::NoLeader => proto_increment_error::Err::NoLeader(ProtoNoLeader {}),
                    IncrementError::Rejected(message) => {
                        proto_increment_error::Err::Rejected(ProtoRejected { message })
                    }
                    fault => proto_increment_error::Err::ServerFault(ProtoServerFault {
                        message: fault.to_string(),
                    }),
                };
                proto_increment_result::Result::Err(ProtoIncrementError { err: Some(err) })
            }
        };

        ProtoIncrementResult { result: Some(result) }
    }
}

#[async_trait::async_trait]
impl RouteDiscovery for RouteServer {
    async fn heartbeat(
        &self,
        rpc_request_wrapped: Request<ProtoHeartbeatReq>,
    ) -> Result<Response<ProtoRouteInfo>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::trace!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_heartbeat(rpc_request);
        slog::trace!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn increment(
        &self,
        rpc_request_wrapped: Request<ProtoIncrementReq>,
    ) -> Result<Response<ProtoIncrementResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_increment(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LeaderInfo, Sid};
    use crate::route::Invoker;
    use crate::store::StoreError;

    #[test]
    fn route_info_uses_empty_maintainer_for_none() {
        let mut route = RouteInfo::new("roundrobin");
        route.learners.insert(Sid::new(2), Invoker::new("10.0.0.2:9000", 3).unwrap());

        let proto = RouteServer::convert_route_info(&route);

        assert_eq!("", proto.maintainer);
        assert_eq!("roundrobin", proto.strategy);
        assert_eq!(
            vec![ProtoLearner {
                sid: 2,
                address: "10.0.0.2:9000".to_string(),
                weight: 3,
            }],
            proto.learners
        );
    }

    #[test]
    fn increment_errors_map_to_redirect_or_fault() {
        fn err_of(e: IncrementError) -> proto_increment_error::Err {
            match RouteServer::convert_increment_result(Err(e)).result {
                Some(proto_increment_result::Result::Err(ProtoIncrementError { err: Some(err) })) => err,
                other => panic!("Expected error, got {:?}", other),
            }
        }

        let leader = LeaderInfo {
            sid: Sid::new(3),
            client_addr: "127.0.0.1:8003".parse().unwrap(),
        };
        assert_eq!(
            proto_increment_error::Err::NotLeader(ProtoNotLeader {
                leader_sid: 3,
                leader_addr: "127.0.0.1:8003".to_string(),
            }),
            err_of(IncrementError::NotLeader(leader))
        );
        assert_eq!(
            proto_increment_error::Err::NoLeader(ProtoNoLeader {}),
            err_of(IncrementError::NoLeader)
        );
        assert_eq!(
            proto_increment_error::Err::Rejected(ProtoRejected {
                message: "Key must not be empty".to_string(),
            }),
            err_of(IncrementError::from(StoreError::EmptyKey))
        );
        assert!(matches!(
            err_of(IncrementError::ActorExited),
            proto_increment_error::Err::ServerFault(_)
        ));
    }
}
