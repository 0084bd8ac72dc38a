mod balance;
mod invoker;
mod learner_table;
mod route_info;
mod router;

pub use balance::BalancerRegistry;
pub use balance::BalancerSettings;
pub use balance::ConsistentHashBalancer;
pub use balance::LoadBalance;
pub use balance::RandomBalancer;
pub use balance::RoundRobinBalancer;
pub use balance::{CONSISTENT_HASH, RANDOM, ROUND_ROBIN};
pub use invoker::InvalidInvokerError;
pub use invoker::Invoker;
pub use learner_table::LearnerTables;
pub use route_info::RouteInfo;
pub use router::parse_bootstrap;
pub use router::Router;
pub use router::RouterError;
