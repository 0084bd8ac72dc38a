#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatReq {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLearner {
    #[prost(uint32, tag = "1")]
    pub sid: u32,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub weight: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRouteInfo {
    /// Empty when no leader is known.
    #[prost(string, tag = "1")]
    pub maintainer: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub learners: ::prost::alloc::vec::Vec<ProtoLearner>,
    #[prost(string, tag = "3")]
    pub strategy: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoIncrementReq {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub value: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoComponentRecord {
    #[prost(uint64, tag = "1")]
    pub create_timestamp: u64,
    #[prost(uint64, tag = "2")]
    pub update_timestamp: u64,
    #[prost(uint64, tag = "3")]
    pub physical_offset: u64,
    #[prost(uint64, tag = "4")]
    pub incr: u64,
    #[prost(string, tag = "5")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub value: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoIncrementResult {
    #[prost(oneof = "proto_increment_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_increment_result::Result>,
}
/// Nested message and enum types in `ProtoIncrementResult`.
pub mod proto_increment_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoComponentRecord),
        #[prost(message, tag = "2")]
        Err(super::ProtoIncrementError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoIncrementError {
    #[prost(oneof = "proto_increment_error::Err", tags = "1, 2, 3, 4")]
    pub err: ::core::option::Option<proto_increment_error::Err>,
}
/// Nested message and enum types in `ProtoIncrementError`.
pub mod proto_increment_error {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Err {
        #[prost(message, tag = "1")]
        NotLeader(super::ProtoNotLeader),
        #[prost(message, tag = "2")]
        NoLeader(super::ProtoNoLeader),
        #[prost(message, tag = "3")]
        Rejected(super::ProtoRejected),
        #[prost(message, tag = "4")]
        ServerFault(super::ProtoServerFault),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNotLeader {
    #[prost(uint32, tag = "1")]
    pub leader_sid: u32,
    #[prost(string, tag = "2")]
    pub leader_addr: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNoLeader {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRejected {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerFault {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[doc = r" Generated client implementations."]
pub mod route_discovery_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Client-facing service of every cluster member. Followers answer Heartbeat too, so clients can"]
    #[doc = " discover the maintainer through any member they can reach."]
    pub struct RouteDiscoveryClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl RouteDiscoveryClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> RouteDiscoveryClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn heartbeat(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoRouteInfo>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/route.RouteDiscovery/Heartbeat");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn increment(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoIncrementReq>,
        ) -> Result<tonic::Response<super::ProtoIncrementResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/route.RouteDiscovery/Increment");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for RouteDiscoveryClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for RouteDiscoveryClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "RouteDiscoveryClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod route_discovery_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with RouteDiscoveryServer."]
    #[async_trait]
    pub trait RouteDiscovery: Send + Sync + 'static {
        async fn heartbeat(
            &self,
            request: tonic::Request<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoRouteInfo>, tonic::Status>;
        async fn increment(
            &self,
            request: tonic::Request<super::ProtoIncrementReq>,
        ) -> Result<tonic::Response<super::ProtoIncrementResult>, tonic::Status>;
    }
    #[doc = " Client-facing service of every cluster member. Followers answer Heartbeat too, so clients can"]
    #[doc = " discover the maintainer through any member they can reach."]
    #[derive(Debug)]
    pub struct RouteDiscoveryServer<T: RouteDiscovery> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: RouteDiscovery> RouteDiscoveryServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for RouteDiscoveryServer<T>
    where
        T: RouteDiscovery,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/route.RouteDiscovery/Heartbeat" => {
                    #[allow(non_camel_case_types)]
                    struct HeartbeatSvc<T: RouteDiscovery>(pub Arc<T>);
                    impl<T: RouteDiscovery> tonic::server::UnaryService<super::ProtoHeartbeatReq> for HeartbeatSvc<T> {
                        type Response = super::ProtoRouteInfo;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoHeartbeatReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).heartbeat(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = HeartbeatSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/route.RouteDiscovery/Increment" => {
                    #[allow(non_camel_case_types)]
                    struct IncrementSvc<T: RouteDiscovery>(pub Arc<T>);
                    impl<T: RouteDiscovery> tonic::server::UnaryService<super::ProtoIncrementReq> for IncrementSvc<T> {
                        type Response = super::ProtoIncrementResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoIncrementReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).increment(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = IncrementSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: RouteDiscovery> Clone for RouteDiscoveryServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: RouteDiscovery> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: RouteDiscovery> tonic::transport::NamedService for RouteDiscoveryServer<T> {
        const NAME: &'static str = "route.RouteDiscovery";
    }
}
