//! Fixed-period background loop with a cooperative stop signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period a loop will run at; zero is raised to this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub(crate) struct PeriodicTask {
    name: &'static str,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period`, starting one period from now.  Must be
    /// called from within a tokio runtime.
    pub(crate) fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period < MIN_PERIOD {
            tracing::warn!(task = name, period_ms = period.as_millis() as u64, "period too short, using 1ms");
        }
        let period = period.max(MIN_PERIOD);
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = signal.notified() => break,
                }
            }
            tracing::debug!(task = name, "background task stopped");
        });
        tracing::debug!(task = name, period_ms = period.as_millis() as u64, "background task started");
        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Signal the loop and wait for it to finish its current tick.
    pub(crate) async fn stop(self) {
        // `notify_one` stores a permit if the loop is mid-tick.
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            tracing::warn!(task = self.name, error = %e, "background task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "ticked {seen} times");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn zero_period_is_raised_to_minimum() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = PeriodicTask::spawn("test", Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        task.stop().await;
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
