use broker::GatewayError;
use log::warn;
use std::thread;
use std::time::Duration;

/// Bounded retry with fixed pacing.
///
/// The pace is slept before *every* attempt, first included, so a
/// burst of calls cannot exceed the exchange's request budget. Clock
/// skew triggers the resync hook before the next attempt; errors that
/// are not retryable, and the error of the final attempt, propagate.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    pace: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, pace: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pace,
        }
    }

    pub fn run<G: ?Sized, T>(
        &self,
        target: &mut G,
        mut op: impl FnMut(&mut G) -> Result<T, GatewayError>,
        mut resync: impl FnMut(&mut G),
    ) -> Result<T, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if !self.pace.is_zero() {
                thread::sleep(self.pace);
            }

            match op(target) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if matches!(e, GatewayError::ClockSkew) {
                        resync(target);
                    }
                    if !e.retryable() || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    warn!("Gateway attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                }
            }
        }
    }
}
