#![forbid(unsafe_code)]

use std::time::Duration;

use crate::ph1e::ServiceErrorKind;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const PH1SCHED_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Upper bounds enforced by `RetrySchedule::validate`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;
pub const MAX_INITIAL_DELAY_MS: u64 = 60_000;
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Retry parameters for one logical call. `max_attempts` counts the initial try.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySchedule {
    pub schema_version: SchemaVersion,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable: Vec<ServiceErrorKind>,
}

impl RetrySchedule {
    pub fn v1(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        retryable: Vec<ServiceErrorKind>,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            schema_version: PH1SCHED_CONTRACT_VERSION,
            max_attempts,
            initial_delay,
            backoff_multiplier,
            retryable,
        };
        s.validate()?;
        Ok(s)
    }

    /// 3 attempts, 500ms initial delay doubling, transient kinds only.
    pub fn mvp_v1() -> Self {
        Self {
            schema_version: PH1SCHED_CONTRACT_VERSION,
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            retryable: ServiceErrorKind::TRANSIENT.to_vec(),
        }
    }

    /// Never retries; the first outcome is final.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::mvp_v1()
        }
    }

    pub fn is_retryable(&self, kind: ServiceErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Wait before retry number `retry_index` (0-based): `initial * multiplier^retry_index`.
    pub fn delay_before_retry(&self, retry_index: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry_index as i32);
        let nanos = (self.initial_delay.as_nanos() as f64 * factor).round();
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
    }

    /// Sum of every backoff wait when all attempts fail retryably.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.delay_before_retry(i))
            .sum()
    }
}

impl Validate for RetrySchedule {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PH1SCHED_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "retry_schedule.schema_version",
                reason: "must match PH1SCHED_CONTRACT_VERSION",
            });
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ContractViolation::InvalidRange {
                field: "retry_schedule.max_attempts",
                min: 1.0,
                max: MAX_ATTEMPTS_LIMIT as f64,
                got: self.max_attempts as f64,
            });
        }
        let initial_ms = self.initial_delay.as_millis();
        if initial_ms > u128::from(MAX_INITIAL_DELAY_MS) {
            return Err(ContractViolation::InvalidRange {
                field: "retry_schedule.initial_delay_ms",
                min: 0.0,
                max: MAX_INITIAL_DELAY_MS as f64,
                got: initial_ms as f64,
            });
        }
        if !self.backoff_multiplier.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "retry_schedule.backoff_multiplier",
            });
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.backoff_multiplier) {
            return Err(ContractViolation::InvalidRange {
                field: "retry_schedule.backoff_multiplier",
                min: 1.0,
                max: MAX_BACKOFF_MULTIPLIER,
                got: self.backoff_multiplier,
            });
        }
        Ok(())
    }
}
