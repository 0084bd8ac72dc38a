use crate::route::balance::{BalancerRegistry, LoadBalance};
use crate::route::{Invoker, RouteInfo};
use std::sync::Arc;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouterError {
    #[error("Bootstrap address list is empty")]
    EmptyBootstrap,
    #[error("Unknown load balance strategy '{0}'")]
    UnknownStrategy(String),
}

/// Split a comma-separated bootstrap list. Whitespace around entries and empty entries are
/// dropped.
pub fn parse_bootstrap(addresses: &str) -> Vec<String> {
    addresses
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// Router is the client-side view of a cluster: the last known maintainer, the learner invokers
/// and the strategy used to pick between them.
pub struct Router {
    registry: BalancerRegistry,
    bootstrap: Vec<String>,
    next_bootstrap: usize,
    maintainer: Option<String>,
    invokers: Vec<Invoker>,
    balancer: Arc<dyn LoadBalance>,
    has_route: bool,
}

impl Router {
    pub fn new(registry: BalancerRegistry, bootstrap: &str, strategy: &str) -> Result<Self, RouterError> {
        let bootstrap = parse_bootstrap(bootstrap);
        if bootstrap.is_empty() {
            return Err(RouterError::EmptyBootstrap);
        }
        let balancer = registry
            .create(strategy)
            .ok_or_else(|| RouterError::UnknownStrategy(strategy.to_string()))?;

        Ok(Router {
            registry,
            bootstrap,
            next_bootstrap: 0,
            maintainer: None,
            invokers: Vec::new(),
            balancer,
            has_route: false,
        })
    }

    /// Adopt a route snapshot from a heartbeat. The balancer is only replaced when the strategy
    /// name changes, which keeps round-robin state across routine refreshes. Unknown strategy
    /// names keep the current balancer.
    pub fn update(&mut self, route: &RouteInfo) -> Result<(), RouterError> {
        self.maintainer = route.maintainer.clone();
        self.invokers = route.invokers();
        self.has_route = true;

        if route.strategy.is_empty() || route.strategy == self.balancer.name() {
            return Ok(());
        }
        match self.registry.create(&route.strategy) {
            Some(balancer) => {
                self.balancer = balancer;
                Ok(())
            }
            None => Err(RouterError::UnknownStrategy(route.strategy.clone())),
        }
    }

    pub fn has_route(&self) -> bool {
        self.has_route
    }

    pub fn maintainer(&self) -> Option<&str> {
        self.maintainer.as_deref()
    }

    pub fn strategy(&self) -> &'static str {
        self.balancer.name()
    }

    pub fn invokers(&self) -> &[Invoker] {
        &self.invokers
    }

    /// Pick an address for a read-style request. Falls back to the maintainer when no learners
    /// are known.
    pub fn select(&self, key: Option<&str>) -> Option<String> {
        match self.balancer.select(&self.invokers, key) {
            Some(invoker) => Some(invoker.address().to_string()),
            None => self.maintainer.clone(),
        }
    }

    /// Next bootstrap address, cycling.
    pub fn next_bootstrap(&mut self) -> String {
        let address = self.bootstrap[self.next_bootstrap % self.bootstrap.len()].clone();
        self.next_bootstrap = (self.next_bootstrap + 1) % self.bootstrap.len();
        address
    }

    /// Forget the maintainer after it stopped answering, so the next request goes through
    /// learners or bootstrap addresses.
    pub fn forget_maintainer(&mut self) {
        self.maintainer = None;
    }
}
