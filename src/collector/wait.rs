//! Bounded "await condition" primitive shared by the login gate and page helpers.

use std::future::Future;
use std::time::Duration;

/// Poll cadence and ceiling for a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl WaitSpec {
    pub const fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    pub const fn secs(interval: u64, ceiling: u64) -> Self {
        Self::new(Duration::from_secs(interval), Duration::from_secs(ceiling))
    }

    /// Number of condition checks the wait may perform; always at least one.
    pub fn max_attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let attempts = self.ceiling.as_millis() / self.interval.as_millis().max(1);
        attempts.clamp(1, u32::MAX as u128) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WaitOutcome::Satisfied { attempts } | WaitOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// Check `condition`, sleeping `spec.interval` between checks, until it holds
/// or `spec.max_attempts()` checks have been made.
pub async fn wait_for<F, Fut>(spec: WaitSpec, mut condition: F) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let max_attempts = spec.max_attempts();
    for attempt in 1..=max_attempts {
        if condition().await {
            return WaitOutcome::Satisfied { attempts: attempt };
        }
        if attempt < max_attempts {
            tokio::time::sleep(spec.interval).await;
        }
    }
    WaitOutcome::TimedOut {
        attempts: max_attempts,
    }
}
