use crate::node::{MemberMetadata, Sid};
use std::net::{IpAddr, SocketAddr};

/// One statically configured cluster member.
#[derive(Clone, Debug)]
pub struct MemberInfo {
    pub sid: u32,
    pub ip_addr: IpAddr,
    /// Port peers dial for quorum traffic.
    pub quorum_port: u16,
    /// Port clients use for route discovery and increments. Published in route tables.
    pub client_port: u16,
    /// Load balance weight. `None` takes the node-wide default.
    pub weight: Option<u32>,
}

impl MemberInfo {
    pub(super) fn quorum_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_addr, self.quorum_port)
    }

    pub(super) fn client_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_addr, self.client_port)
    }

    pub(super) fn into_metadata(self, default_weight: u32) -> MemberMetadata {
        MemberMetadata::new(
            Sid::new(self.sid),
            self.quorum_addr(),
            self.client_addr(),
            self.weight.unwrap_or(default_weight),
        )
    }
}
