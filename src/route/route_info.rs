use crate::node::Sid;
use crate::route::Invoker;
use std::collections::BTreeMap;

/// RouteInfo is a cluster membership snapshot: who is leader (the maintainer), which followers
/// are registered as learners, and which load-balance strategy clients should use.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteInfo {
    /// Client-facing address of the node currently believed to be leader.
    pub maintainer: Option<String>,
    pub learners: BTreeMap<Sid, Invoker>,
    pub strategy: String,
}

impl RouteInfo {
    pub fn new<S: Into<String>>(strategy: S) -> Self {
        RouteInfo {
            maintainer: None,
            learners: BTreeMap::new(),
            strategy: strategy.into(),
        }
    }

    /// Learners in sid order.
    pub fn invokers(&self) -> Vec<Invoker> {
        self.learners.values().cloned().collect()
    }
}
