use crate::node::Sid;
use crate::route::{InvalidInvokerError, Invoker, RouteInfo};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// LearnerTables holds one RouteInfo per cluster name.
///
/// Readers get an `Arc` snapshot and never block writers for longer than a pointer swap. Writers
/// build a fresh RouteInfo from the current one and swap it in, so a published snapshot is never
/// mutated.
pub struct LearnerTables {
    default_strategy: String,
    tables: RwLock<HashMap<String, Arc<RouteInfo>>>,
}

impl LearnerTables {
    pub fn new<S: Into<String>>(default_strategy: S) -> Self {
        LearnerTables {
            default_strategy: default_strategy.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert `sid` with (addr, weight). Returns true iff the table changed.
    pub fn register_learner(
        &self,
        cluster: &str,
        sid: Sid,
        addr: &str,
        weight: u32,
    ) -> Result<bool, InvalidInvokerError> {
        let invoker = Invoker::new(addr, weight)?;
        Ok(self.modify(cluster, |route| {
            if route.learners.get(&sid) == Some(&invoker) {
                return false;
            }
            route.learners.insert(sid, invoker);
            true
        }))
    }

    /// Remove `sid`. Absent sids are a no-op. Returns true iff the table changed.
    pub fn unregister_learner(&self, cluster: &str, sid: Sid) -> bool {
        self.modify(cluster, |route| route.learners.remove(&sid).is_some())
    }

    /// Replace the learner set with the one carried by a leader's snapshot. Returns true iff
    /// membership or any (addr, weight) pair changed.
    pub fn update_learner(&self, cluster: &str, incoming: &RouteInfo) -> bool {
        self.modify(cluster, |route| {
            if route.learners == incoming.learners {
                return false;
            }
            route.learners = incoming.learners.clone();
            true
        })
    }

    pub fn set_maintainer(&self, cluster: &str, maintainer: Option<String>) -> bool {
        self.modify(cluster, |route| {
            if route.maintainer == maintainer {
                return false;
            }
            route.maintainer = maintainer;
            true
        })
    }

    pub fn set_strategy(&self, cluster: &str, strategy: &str) -> bool {
        self.modify(cluster, |route| {
            if route.strategy == strategy {
                return false;
            }
            route.strategy = strategy.to_string();
            true
        })
    }

    /// Current snapshot for `cluster`. Unknown clusters yield an empty table with the default
    /// strategy.
    pub fn route_info(&self, cluster: &str) -> Arc<RouteInfo> {
        let tables = self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match tables.get(cluster) {
            Some(route) => route.clone(),
            None => Arc::new(RouteInfo::new(self.default_strategy.clone())),
        }
    }

    fn modify<F>(&self, cluster: &str, mutation: F) -> bool
    where
        F: FnOnce(&mut RouteInfo) -> bool,
    {
        let mut tables = self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = match tables.get(cluster) {
            Some(current) => RouteInfo::clone(current),
            None => RouteInfo::new(self.default_strategy.clone()),
        };

        let changed = mutation(&mut next);
        if changed {
            tables.insert(cluster.to_string(), Arc::new(next));
        }
        changed
    }
}
