use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::orchestrator::types::SessionEvent;
use crate::speech::traits::EventSink;

/// A timer that posts into the session inbox. Dropping the task aborts it, so
/// whoever owns the `ScheduledTask` owns the timer's lifetime.
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// The deadline is fixed when scheduled, not when the task first runs.
    pub(crate) fn once(delay: Duration, sink: EventSink, event: SessionEvent) -> Self {
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            sink.post(event);
        });
        Self { handle }
    }

    /// Posts `make()` every `period`, first after one full period.
    pub(crate) fn every<F>(period: Duration, sink: EventSink, make: F) -> Self
    where
        F: Fn() -> SessionEvent + Send + 'static,
    {
        let start = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !sink.post(make()) {
                    break;
                }
            }
        });
        Self { handle }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
