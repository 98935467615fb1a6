use super::{Clock, ExpireFn, TickFn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

/// Wall-clock countdown driven by a tokio interval
///
/// Each countdown is tagged with a generation number. `cancel()` bumps the generation
/// before aborting the task, so a callback racing with cancellation sees the mismatch
/// and is dropped.
pub struct TokioClock {
    period: Duration,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    /// A clock whose "second" lasts `period`. Used to run sessions faster than real time.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn start(&mut self, seconds: u32, mut on_tick: TickFn, on_expire: ExpireFn) {
        self.cancel();

        let current = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let period = self.period;

        debug!("Countdown {} started: {}s", current, seconds);

        self.task = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            let mut remaining = seconds;

            while remaining > 0 {
                interval.tick().await;
                if generation.load(Ordering::SeqCst) != current {
                    return;
                }
                remaining -= 1;
                on_tick(remaining);
            }

            if generation.load(Ordering::SeqCst) == current {
                on_expire();
            }
        }));
    }

    fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TokioClock {
    fn drop(&mut self) {
        self.cancel();
    }
}
