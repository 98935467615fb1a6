use super::{Clock, ExpireFn, TickFn};
use std::sync::{Arc, Mutex, MutexGuard};

struct Countdown {
    remaining: u32,
    on_tick: TickFn,
    on_expire: Option<ExpireFn>,
}

#[derive(Default)]
struct ManualState {
    countdown: Option<Countdown>,
    started_with: Vec<u32>,
    elapsed: u64,
}

/// Countdown that only moves when `advance` is called
///
/// Clones share the same countdown, so a test can keep one handle while the session
/// machine owns another. Callbacks run on the caller of `advance` while the clock's
/// internal lock is held; they must not call back into the clock.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Let `seconds` seconds elapse, delivering ticks and at most one expiry.
    pub fn advance(&self, seconds: u32) {
        let mut state = self.lock();
        for _ in 0..seconds {
            state.elapsed += 1;

            let Some(countdown) = state.countdown.as_mut() else {
                continue;
            };
            countdown.remaining = countdown.remaining.saturating_sub(1);
            let remaining = countdown.remaining;
            (countdown.on_tick)(remaining);

            if remaining == 0 {
                if let Some(mut finished) = state.countdown.take() {
                    if let Some(on_expire) = finished.on_expire.take() {
                        on_expire();
                    }
                }
            }
        }
    }

    /// Remaining seconds of the active countdown
    pub fn remaining(&self) -> Option<u32> {
        self.lock().countdown.as_ref().map(|c| c.remaining)
    }

    /// Durations of every countdown started so far, in order
    pub fn started_with(&self) -> Vec<u32> {
        self.lock().started_with.clone()
    }

    /// Total seconds advanced since creation
    pub fn elapsed(&self) -> u64 {
        self.lock().elapsed
    }
}

impl Clock for ManualClock {
    fn start(&mut self, seconds: u32, on_tick: TickFn, on_expire: ExpireFn) {
        let mut state = self.lock();
        state.started_with.push(seconds);

        if seconds == 0 {
            state.countdown = None;
            on_expire();
            return;
        }

        state.countdown = Some(Countdown {
            remaining: seconds,
            on_tick,
            on_expire: Some(on_expire),
        });
    }

    fn cancel(&mut self) {
        self.lock().countdown = None;
    }

    fn is_running(&self) -> bool {
        self.lock().countdown.is_some()
    }
}
