mod quorum_server;
mod route_server;
mod shutdown;

pub(crate) use quorum_server::QuorumServer;
pub(crate) use route_server::RouteServer;
pub(crate) use shutdown::ShutdownHandle;
pub(crate) use shutdown::ShutdownSignal;
