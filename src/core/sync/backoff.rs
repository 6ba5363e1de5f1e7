/*!
 * Adaptive Poll Backoff
 *
 * Paces non-blocking polling loops so that short waits stay low-latency
 * while long waits stop burning a whole core:
 *
 * 1. **Tight spin phase**: just `spin_loop()` hints
 * 2. **Yield phase**: `yield_now()` every iteration
 * 3. **Sleep phase**: exponentially increasing sleep, capped
 */

use crate::core::config::PollConfig;
use std::thread;
use std::time::Duration;

/// Backoff state for one polling loop
#[derive(Debug)]
pub struct Backoff {
    config: PollConfig,
    step: u32,
    sleep: Duration,
}

impl Backoff {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            step: 0,
            sleep: Duration::from_nanos(1),
        }
    }

    /// Wait a little before the next poll
    pub fn snooze(&mut self) {
        let spin_end = self.config.spin_iterations;
        let yield_end = spin_end.saturating_add(self.config.yield_iterations);

        if self.step < spin_end {
            std::hint::spin_loop();
        } else if self.step < yield_end {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
            self.sleep = (self.sleep * 2).min(self.config.max_sleep);
        }

        self.step = self.step.saturating_add(1);
    }

    /// Start over from the tight spin phase (call after progress)
    pub fn reset(&mut self) {
        self.step = 0;
        self.sleep = Duration::from_nanos(1);
    }

    /// Whether the loop has reached the sleep phase
    #[cfg(test)]
    fn is_sleeping(&self) -> bool {
        self.step
            >= self
                .config
                .spin_iterations
                .saturating_add(self.config.yield_iterations)
    }
}
