use crate::route::balance::{LoadBalance, CONSISTENT_HASH};
use crate::route::Invoker;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

const VIRTUAL_NODES_PER_INVOKER: usize = 160;

struct Ring {
    invokers: Vec<Invoker>,
    points: BTreeMap<u64, usize>,
}

impl Ring {
    fn build(invokers: &[Invoker]) -> Self {
        let mut points = BTreeMap::new();
        for (i, invoker) in invokers.iter().enumerate() {
            for replica in 0..VIRTUAL_NODES_PER_INVOKER {
                points.insert(hash_of(&(invoker.address(), replica)), i);
            }
        }

        Ring {
            invokers: invokers.to_vec(),
            points,
        }
    }

    fn lookup(&self, point: u64) -> Option<&Invoker> {
        self.points
            .range(point..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, i)| &self.invokers[*i])
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Consistent hashing keyed by request key. The same key maps to the same invoker for as long as
/// the invoker set is stable, and only keys owned by a removed invoker move when the set shrinks.
/// Requests without a key land on a random point of the ring.
#[derive(Default)]
pub struct ConsistentHashBalancer {
    ring: Mutex<Option<Arc<Ring>>>,
}

impl ConsistentHashBalancer {
    pub fn new() -> Self {
        ConsistentHashBalancer { ring: Mutex::new(None) }
    }

    fn ring_for(&self, invokers: &[Invoker]) -> Arc<Ring> {
        let mut cached = self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cached.as_ref() {
            Some(ring) if ring.invokers == invokers => ring.clone(),
            _ => {
                let ring = Arc::new(Ring::build(invokers));
                cached.replace(ring.clone());
                ring
            }
        }
    }
}

impl LoadBalance for ConsistentHashBalancer {
    fn name(&self) -> &'static str {
        CONSISTENT_HASH
    }

    fn select(&self, invokers: &[Invoker], key: Option<&str>) -> Option<Invoker> {
        if invokers.len() <= 1 {
            return invokers.first().cloned();
        }

        let point = match key {
            Some(key) => hash_of(&key),
            None => rand::thread_rng().gen(),
        };
        self.ring_for(invokers).lookup(point).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invokers(n: usize) -> Vec<Invoker> {
        (0..n)
            .map(|i| Invoker::new(format!("10.0.0.{}:9000", i), 1).unwrap())
            .collect()
    }

    #[test]
    fn same_key_same_invoker() {
        let balancer = ConsistentHashBalancer::new();
        let invokers = invokers(5);
        for key in ["order", "user", "集群"].iter() {
            let first = balancer.select(&invokers, Some(*key));
            for _ in 0..10 {
                assert_eq!(first, balancer.select(&invokers, Some(*key)));
            }
        }
    }

    #[test]
    fn removing_an_invoker_only_moves_its_keys() {
        let balancer = ConsistentHashBalancer::new();
        let all = invokers(5);
        let removed = all[2].clone();
        let remaining: Vec<Invoker> = all.iter().filter(|i| **i != removed).cloned().collect();

        for k in 0..500 {
            let key = format!("key-{}", k);
            let before = balancer.select(&all, Some(&key)).unwrap();
            let after = balancer.select(&remaining, Some(&key)).unwrap();
            if before != removed {
                assert_eq!(before, after, "{} moved", key);
            }
        }
    }

    #[test]
    fn spreads_keys_over_invokers() {
        let balancer = ConsistentHashBalancer::new();
        let invokers = invokers(4);
        let mut hits = vec![0usize; 4];
        for k in 0..4000 {
            let picked = balancer.select(&invokers, Some(&format!("k{}", k))).unwrap();
            let i = invokers.iter().position(|i| *i == picked).unwrap();
            hits[i] += 1;
        }
        for count in hits {
            assert!(count > 400, "skewed distribution");
        }
    }
}
