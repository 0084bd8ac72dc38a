use crate::route::balance::{effective_weights, LoadBalance, RANDOM};
use crate::route::Invoker;
use rand::Rng;

/// Weighted random selection. Stateless.
#[derive(Default)]
pub struct RandomBalancer;

impl RandomBalancer {
    pub fn new() -> Self {
        RandomBalancer
    }
}

impl LoadBalance for RandomBalancer {
    fn name(&self) -> &'static str {
        RANDOM
    }

    fn select(&self, invokers: &[Invoker], _key: Option<&str>) -> Option<Invoker> {
        if invokers.len() <= 1 {
            return invokers.first().cloned();
        }

        let weights = effective_weights(invokers);
        let total: u64 = weights.iter().sum();
        let mut point = rand::thread_rng().gen_range(0..total);
        for (invoker, weight) in invokers.iter().zip(weights) {
            if point < weight {
                return Some(invoker.clone());
            }
            point -= weight;
        }

        invokers.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn never_picks_zero_weight_when_others_have_weight() {
        let balancer = RandomBalancer::new();
        let invokers = vec![Invoker::new("a:1", 0).unwrap(), Invoker::new("b:1", 1).unwrap()];
        for _ in 0..200 {
            assert_eq!(Some(invokers[1].clone()), balancer.select(&invokers, None));
        }
    }

    #[test]
    fn follows_weights_roughly() {
        let balancer = RandomBalancer::new();
        let invokers = vec![Invoker::new("a:1", 1).unwrap(), Invoker::new("b:1", 3).unwrap()];

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..4000 {
            let picked = balancer.select(&invokers, None).unwrap();
            *counts.entry(picked.address().to_string()).or_default() += 1;
        }

        // Expected 1000 / 3000. The bounds are many standard deviations wide.
        let a = counts["a:1"];
        assert!(a > 700 && a < 1300, "a picked {} times", a);
    }
}
