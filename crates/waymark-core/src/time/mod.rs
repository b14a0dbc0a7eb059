use std::time::{Duration, Instant};

/// Time source for the session's deadline bookkeeping. Abstracted so tests
/// can drive timeouts deterministically.
pub trait Clock {
    fn now(&mut self) -> Duration;
}

/// Wall-clock time measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}
