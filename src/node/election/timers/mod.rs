mod deadline;
mod liveness_timer;
mod ticker;
mod time;

#[cfg(test)]
mod test_utils;

pub(super) use liveness_timer::LivenessTimerHandle;
pub(super) use ticker::TickerHandle;
