use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Deadline is a wake-up time shared between a timer handle and its task. The handle pushes new
/// deadlines; the task takes them, so an empty slot means nothing moved the deadline since the
/// task last slept.
#[derive(Clone, Default)]
pub(super) struct Deadline {
    slot: Arc<Mutex<Option<Instant>>>,
}

impl Deadline {
    pub(super) fn set(&self, at: Instant) {
        *self.lock() = Some(at);
    }

    pub(super) fn take(&self) -> Option<Instant> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        // Nothing can panic while holding the lock, recover the value regardless.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
