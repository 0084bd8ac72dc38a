//! Client-facing API: starting a node, talking to it in process, and reaching a cluster over the
//! network.
mod event_bus;
mod node_handle;
mod options;
mod route_client;
mod types;
mod wiring;

pub use event_bus::ElectionEvent;
pub use event_bus::NodeEvent;
pub use event_bus::NodeEventListener;
pub use node_handle::NodeHandle;
pub use options::NodeOptions;
pub use route_client::ClientError;
pub use route_client::RouteClient;
pub use route_client::RouteClientConfig;
pub use route_client::RouteHeartbeatHandle;
pub use types::MemberInfo;
pub use wiring::start_node;
pub use wiring::NodeConfig;
pub use wiring::NodeCreationError;
