mod consistent_hash;
mod random;
mod round_robin;

use crate::route::Invoker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use consistent_hash::ConsistentHashBalancer;
pub use random::RandomBalancer;
pub use round_robin::RoundRobinBalancer;

pub const RANDOM: &str = "random";
pub const ROUND_ROBIN: &str = "roundrobin";
pub const CONSISTENT_HASH: &str = "consistenthash";

/// LoadBalance picks one invoker per request. Implementations may keep state between calls but
/// must tolerate the invoker list changing arbitrarily between them.
pub trait LoadBalance: Send + Sync {
    fn name(&self) -> &'static str;

    /// `key` is the request key; strategies that don't shard by key ignore it.
    fn select(&self, invokers: &[Invoker], key: Option<&str>) -> Option<Invoker>;
}

type BalancerFactory = fn(&BalancerSettings) -> Arc<dyn LoadBalance>;

#[derive(Clone, Debug)]
pub struct BalancerSettings {
    /// Round-robin forgets per-address weight state that hasn't been touched for this long.
    pub recycle_period: Duration,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        BalancerSettings {
            recycle_period: Duration::from_secs(60),
        }
    }
}

/// BalancerRegistry resolves strategy names to fresh balancer instances. Build it once with
/// `BalancerRegistry::build()` and pass it to whoever needs to derive strategies.
#[derive(Clone)]
pub struct BalancerRegistry {
    settings: BalancerSettings,
    factories: HashMap<&'static str, BalancerFactory>,
}

impl BalancerRegistry {
    pub fn build() -> Self {
        Self::build_with(BalancerSettings::default())
    }

    pub fn build_with(settings: BalancerSettings) -> Self {
        let mut factories: HashMap<&'static str, BalancerFactory> = HashMap::new();
        factories.insert(RANDOM, new_random);
        factories.insert(ROUND_ROBIN, new_round_robin);
        factories.insert(CONSISTENT_HASH, new_consistent_hash);

        BalancerRegistry { settings, factories }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Option<Arc<dyn LoadBalance>> {
        self.factories.get(name).map(|factory| factory(&self.settings))
    }
}

fn new_random(_: &BalancerSettings) -> Arc<dyn LoadBalance> {
    Arc::new(RandomBalancer::new())
}

fn new_round_robin(settings: &BalancerSettings) -> Arc<dyn LoadBalance> {
    Arc::new(RoundRobinBalancer::new(settings.recycle_period))
}

fn new_consistent_hash(_: &BalancerSettings) -> Arc<dyn LoadBalance> {
    Arc::new(ConsistentHashBalancer::new())
}

/// Weight used for selection. Zero-weight invokers are only picked when every invoker has zero
/// weight, in which case they are treated as equal.
pub(super) fn effective_weights(invokers: &[Invoker]) -> Vec<u64> {
    let all_zero = invokers.iter().all(|invoker| invoker.weight() == 0);
    invokers
        .iter()
        .map(|invoker| if all_zero { 1 } else { invoker.weight() as u64 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        let registry = BalancerRegistry::build();
        for name in [RANDOM, ROUND_ROBIN, CONSISTENT_HASH].iter() {
            let balancer = registry.create(name).unwrap();
            assert_eq!(*name, balancer.name());
        }
        assert!(registry.create("fastest").is_none());
        assert!(!registry.contains(""));
    }

    #[test]
    fn every_strategy_handles_empty_and_single() {
        let registry = BalancerRegistry::build();
        let only = Invoker::new("h:1", 1).unwrap();
        for name in [RANDOM, ROUND_ROBIN, CONSISTENT_HASH].iter() {
            let balancer = registry.create(name).unwrap();
            assert_eq!(None, balancer.select(&[], Some("k")));
            assert_eq!(Some(only.clone()), balancer.select(&[only.clone()], Some("k")));
            assert_eq!(Some(only.clone()), balancer.select(&[only.clone()], None));
        }
    }
}
