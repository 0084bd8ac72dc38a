use crate::node::election::LeaderInfo;
use crate::store::{ComponentRecord, StoreError};

#[derive(Debug)]
pub(crate) struct IncrementInput {
    pub(crate) key: String,
    /// Rendered template value stored alongside the counter.
    pub(crate) value: String,
}

#[derive(Debug)]
pub(crate) struct RemoveInput {
    pub(crate) key: String,
}

#[derive(Debug)]
pub(crate) struct WriteOutput {
    pub(crate) record: ComponentRecord,
}

/// Failure of a leader-side write (increment or remove).
#[derive(Debug, thiserror::Error)]
pub enum IncrementError {
    #[error("Not the leader, redirect to {0:?}")]
    NotLeader(LeaderInfo),

    // Retry after a short delay. An election is most likely in progress.
    #[error("No leader is known")]
    NoLeader,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Failed to append record")]
    Storage(#[source] StoreError),

    #[error("Node actor has exited")]
    ActorExited,
}

impl From<StoreError> for IncrementError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::EmptyKey | StoreError::UnknownKey(_) | StoreError::RecordTooLarge { .. } => {
                IncrementError::Rejected(e.to_string())
            }
            other => IncrementError::Storage(other),
        }
    }
}
