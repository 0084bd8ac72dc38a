use crate::route::balance::{effective_weights, LoadBalance, ROUND_ROBIN};
use crate::route::Invoker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct WeightedState {
    weight: u64,
    current: i64,
    last_selected_round: Instant,
}

struct Snapshot {
    states: Arc<HashMap<String, WeightedState>>,
    last_recycle: Instant,
}

/// Smooth weighted round-robin.
///
/// Per-address state lives in an immutable map. Each selection copies it, updates the copy and
/// swaps it back under a short mutex. Addresses that stop appearing in the invoker list are
/// evicted once they've been untouched for `recycle_period`.
///
/// Contended selections wait for the lock rather than degrading to a random pick. They are
/// counted so callers can observe contention.
pub struct RoundRobinBalancer {
    recycle_period: Duration,
    snapshot: Mutex<Snapshot>,
    contended: AtomicU64,
}

impl RoundRobinBalancer {
    pub fn new(recycle_period: Duration) -> Self {
        RoundRobinBalancer {
            recycle_period,
            snapshot: Mutex::new(Snapshot {
                states: Arc::new(HashMap::new()),
                last_recycle: Instant::now(),
            }),
            contended: AtomicU64::new(0),
        }
    }

    /// Number of selections that had to wait on another selection.
    pub fn contended_selections(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    fn select_at(&self, invokers: &[Invoker], now: Instant) -> Option<Invoker> {
        if invokers.len() <= 1 {
            return invokers.first().cloned();
        }

        let mut snapshot = match self.snapshot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let mut states = HashMap::clone(&snapshot.states);
        let weights = effective_weights(invokers);
        let total: i64 = weights.iter().map(|w| *w as i64).sum();

        let mut selected: Option<(usize, i64)> = None;
        for (i, (invoker, weight)) in invokers.iter().zip(weights).enumerate() {
            let state = states
                .entry(invoker.address().to_string())
                .or_insert_with(|| WeightedState {
                    weight,
                    current: 0,
                    last_selected_round: now,
                });
            if state.weight != weight {
                state.weight = weight;
                state.current = 0;
            }
            state.current += weight as i64;
            state.last_selected_round = now;

            match selected {
                Some((_, best)) if best >= state.current => {}
                _ => selected = Some((i, state.current)),
            }
        }

        let picked = selected.map(|(i, _)| &invokers[i]);
        if let Some(invoker) = picked {
            if let Some(state) = states.get_mut(invoker.address()) {
                state.current -= total;
            }
        }

        if now.duration_since(snapshot.last_recycle) >= self.recycle_period {
            let recycle_period = self.recycle_period;
            states.retain(|_, state| now.duration_since(state.last_selected_round) < recycle_period);
            snapshot.last_recycle = now;
        }

        snapshot.states = Arc::new(states);
        picked.cloned()
    }

    #[cfg(test)]
    fn tracked_addresses(&self) -> usize {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .states
            .len()
    }
}

impl LoadBalance for RoundRobinBalancer {
    fn name(&self) -> &'static str {
        ROUND_ROBIN
    }

    fn select(&self, invokers: &[Invoker], _key: Option<&str>) -> Option<Invoker> {
        self.select_at(invokers, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoker(address: &str, weight: u32) -> Invoker {
        Invoker::new(address, weight).unwrap()
    }

    #[test]
    fn weighted_one_to_two() {
        let balancer = RoundRobinBalancer::new(Duration::from_secs(60));
        let invokers = vec![invoker("A", 1), invoker("B", 2)];

        let mut a = 0;
        let mut b = 0;
        for _ in 0..3000 {
            match balancer.select(&invokers, None).unwrap().address() {
                "A" => a += 1,
                "B" => b += 1,
                other => panic!("Unexpected invoker {}", other),
            }
        }

        let ratio = b as f64 / a as f64;
        assert!(ratio > 1.8 && ratio < 2.2, "A={} B={}", a, b);
    }

    #[test]
    fn smooth_interleaving() {
        let balancer = RoundRobinBalancer::new(Duration::from_secs(60));
        let invokers = vec![invoker("A", 5), invoker("B", 1), invoker("C", 1)];

        let picks: Vec<String> = (0..7)
            .map(|_| balancer.select(&invokers, None).unwrap().address().to_string())
            .collect();

        // A never gets more than two picks in a row under smooth weighting.
        assert_eq!(vec!["A", "A", "B", "A", "C", "A", "A"], picks);
    }

    #[test]
    fn fairness_survives_invoker_list_refresh() {
        let balancer = RoundRobinBalancer::new(Duration::from_secs(60));
        let invokers = vec![invoker("A", 1), invoker("B", 1)];

        let first = balancer.select(&invokers, None).unwrap();
        // Same members, freshly built list.
        let refreshed = vec![invoker("A", 1), invoker("B", 1)];
        let second = balancer.select(&refreshed, None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn stale_addresses_are_recycled() {
        let recycle = Duration::from_secs(10);
        let balancer = RoundRobinBalancer::new(recycle);
        let start = Instant::now();

        balancer.select_at(&[invoker("A", 1), invoker("B", 1)], start);
        assert_eq!(2, balancer.tracked_addresses());

        // B disappears. After a recycle period it is forgotten.
        balancer.select_at(&[invoker("A", 1), invoker("C", 1)], start + recycle / 2);
        assert_eq!(3, balancer.tracked_addresses());
        balancer.select_at(&[invoker("A", 1), invoker("C", 1)], start + recycle * 2);
        assert_eq!(2, balancer.tracked_addresses());
        assert_eq!(0, balancer.contended_selections());
    }
}
