use crate::route::{BalancerRegistry, ROUND_ROBIN};
use crate::store::{HEADER_SIZE, RECORD_FIXED_SIZE};
use std::convert::TryFrom;
use tokio::time::Duration;

/// Tuning knobs for a node. Anything left `None` takes the default noted on the field.
#[derive(Clone, Default)]
pub struct NodeOptions {
    /// How often the leader heartbeats followers. Default 100ms.
    pub heartbeat_interval: Option<Duration>,
    /// A follower starts searching after hearing nothing from its leader for a random duration
    /// in `[min, max]`. Default 500ms to 1500ms.
    pub leader_liveness_min_timeout: Option<Duration>,
    pub leader_liveness_max_timeout: Option<Duration>,
    /// How often a searching node rebroadcasts its vote while the round is stalled. Default 200ms.
    pub election_retry_interval: Option<Duration>,
    /// Learners silent for this long are dropped from the route table. Default 3s.
    pub learner_recycle_period: Option<Duration>,
    /// Bytes per store segment, header included. Default 1 MiB.
    pub segment_size: Option<u64>,
    /// Load balance strategy advertised to clients. Default `roundrobin`.
    pub load_balance_strategy: Option<String>,
    /// Weight of members whose `MemberInfo` has none. Default 1.
    pub learner_weight: Option<u32>,
}

#[derive(Clone, Debug)]
pub(super) struct NodeOptionsValidated {
    pub heartbeat_interval: Duration,
    pub leader_liveness_min_timeout: Duration,
    pub leader_liveness_max_timeout: Duration,
    pub election_retry_interval: Duration,
    pub learner_recycle_period: Duration,
    pub segment_size: u64,
    pub load_balance_strategy: String,
    pub learner_weight: u32,
}

impl NodeOptionsValidated {
    fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval >= self.leader_liveness_min_timeout {
            return Err("Leader liveness minimum timeout must be greater than the leader's heartbeat".into());
        }
        if self.leader_liveness_min_timeout >= self.leader_liveness_max_timeout {
            return Err("Leader liveness minimum timeout must be less than maximum timeout".into());
        }
        if self.election_retry_interval == Duration::from_millis(0) {
            return Err("Election retry interval must be non-zero".into());
        }
        if self.segment_size <= HEADER_SIZE + RECORD_FIXED_SIZE {
            return Err(format!(
                "Segment size must exceed {} bytes to hold a header and a record",
                HEADER_SIZE + RECORD_FIXED_SIZE
            ));
        }
        if !BalancerRegistry::build().contains(&self.load_balance_strategy) {
            return Err(format!(
                "Unknown load balance strategy '{}'",
                self.load_balance_strategy
            ));
        }

        Ok(())
    }
}

impl TryFrom<NodeOptions> for NodeOptionsValidated {
    type Error = String;

    fn try_from(options: NodeOptions) -> Result<Self, Self::Error> {
        let values = NodeOptionsValidated {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_millis(100)),
            leader_liveness_min_timeout: options
                .leader_liveness_min_timeout
                .unwrap_or(Duration::from_millis(500)),
            leader_liveness_max_timeout: options
                .leader_liveness_max_timeout
                .unwrap_or(Duration::from_millis(1500)),
            election_retry_interval: options.election_retry_interval.unwrap_or(Duration::from_millis(200)),
            learner_recycle_period: options.learner_recycle_period.unwrap_or(Duration::from_secs(3)),
            segment_size: options.segment_size.unwrap_or(1024 * 1024),
            load_balance_strategy: options
                .load_balance_strategy
                .unwrap_or_else(|| ROUND_ROBIN.to_string()),
            learner_weight: options.learner_weight.unwrap_or(1),
        };

        values.validate()?;
        Ok(values)
    }
}
