#![forbid(unsafe_code)]

use std::time::Duration;

use voxdesk_kernel_contracts::ph1e::ServiceError;
use voxdesk_kernel_contracts::ph1sched::RetrySchedule;
use voxdesk_kernel_contracts::{ContractViolation, Validate};

/// Blocking wait between attempts.
pub trait Sleeper {
    fn sleep(&mut self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Records requested waits instead of waiting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSleeper {
    pub waits: Vec<Duration>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, delay: Duration) {
        self.waits.push(delay);
    }
}

/// Runs `operation` up to `schedule.max_attempts` times. Only retryable kinds are retried;
/// the last attempt's outcome is returned unchanged.
pub fn call_with_retry<T, F>(
    schedule: &RetrySchedule,
    sleeper: &mut dyn Sleeper,
    operation: &str,
    mut f: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Result<T, ServiceError>,
{
    let mut attempt: u32 = 1;
    loop {
        match f() {
            Ok(v) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "call succeeded after retry");
                }
                return Ok(v);
            }
            Err(err) if attempt < schedule.max_attempts && schedule.is_retryable(err.kind) => {
                let delay = schedule.delay_before_retry(attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = schedule.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure, backing off"
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy<S = ThreadSleeper>
where
    S: Sleeper,
{
    schedule: RetrySchedule,
    sleeper: S,
}

impl<S> RetryPolicy<S>
where
    S: Sleeper,
{
    pub fn new(schedule: RetrySchedule, sleeper: S) -> Result<Self, ContractViolation> {
        schedule.validate()?;
        Ok(Self { schedule, sleeper })
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn call<T, F>(&mut self, operation: &str, f: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Result<T, ServiceError>,
    {
        call_with_retry(&self.schedule, &mut self.sleeper, operation, f)
    }
}
