use crate::actor::ActorClient;
use crate::api::NodeEventListener;
use crate::node::{IncrementError, IncrementInput, RemoveInput};
use crate::server::ShutdownHandle;
use crate::store::ComponentRecord;

/// NodeHandle is the application's grip on a running node. Dropping it shuts the node down.
pub struct NodeHandle {
    actor_client: ActorClient,
    event_listener: NodeEventListener,
    _shutdown_handle: ShutdownHandle,
}

impl NodeHandle {
    pub(super) fn new(
        actor_client: ActorClient,
        event_listener: NodeEventListener,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        NodeHandle {
            actor_client,
            event_listener,
            _shutdown_handle: shutdown_handle,
        }
    }

    /// Draws the next counter value for `key` and stores `value` with it. Only the leader accepts
    /// writes; other members answer with `NotLeader` or `NoLeader`.
    pub async fn increment<K: Into<String>, V: Into<String>>(
        &self,
        key: K,
        value: V,
    ) -> Result<ComponentRecord, IncrementError> {
        let input = IncrementInput {
            key: key.into(),
            value: value.into(),
        };
        self.actor_client.increment(input).await.map(|output| output.record)
    }

    /// Writes a tombstone for `key`. Leader only, like `increment`.
    pub async fn remove<K: Into<String>>(&self, key: K) -> Result<ComponentRecord, IncrementError> {
        let input = RemoveInput { key: key.into() };
        self.actor_client.remove(input).await.map(|output| output.record)
    }

    /// Latest record for `key` in this node's replica. Followers may lag the leader by up to one
    /// heartbeat.
    pub async fn lookup<K: Into<String>>(&self, key: K) -> Result<Option<ComponentRecord>, IncrementError> {
        self.actor_client
            .lookup(key.into())
            .await
            .map_err(|_| IncrementError::ActorExited)
    }

    pub fn event_listener(&self) -> NodeEventListener {
        self.event_listener.clone()
    }
}
