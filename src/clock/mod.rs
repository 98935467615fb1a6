//! One-second countdown primitive shared by every timed phase
//!
//! A `Clock` delivers `on_tick(remaining)` once per elapsed second and `on_expire()`
//! exactly once when the countdown reaches zero. Starting a new countdown cancels the
//! previous one; no callback of a cancelled countdown is delivered afterwards.
//!
//! - `TokioClock`: wall-clock countdown on the tokio runtime
//! - `ManualClock`: advanced explicitly, for tests and headless drivers

mod manual;
mod tokio_clock;

pub use manual::ManualClock;
pub use tokio_clock::TokioClock;

/// Called with the new remaining value after each elapsed second
pub type TickFn = Box<dyn FnMut(u32) + Send>;

/// Called once when the countdown reaches zero
pub type ExpireFn = Box<dyn FnOnce() + Send>;

pub trait Clock: Send {
    /// Begin counting down from `seconds`, replacing any running countdown.
    fn start(&mut self, seconds: u32, on_tick: TickFn, on_expire: ExpireFn);

    /// Stop delivery for the current countdown. Idempotent.
    fn cancel(&mut self);

    /// Whether a countdown is still pending expiry
    fn is_running(&self) -> bool;
}
