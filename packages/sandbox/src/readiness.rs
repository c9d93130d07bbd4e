// ABOUTME: Bounded, cancellable wait for a freshly launched sandbox to report an instance
// ABOUTME: Polls with exponential backoff under an explicit deadline

use crate::error::{Result, SandboxError};
use crate::types::SandboxHandle;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Polling schedule and deadline for the readiness wait
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            multiplier: 1.5,
            randomization_factor: 0.25,
            timeout: Duration::from_secs(180),
        }
    }
}

impl ReadinessPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(SandboxError::Config(
                "readiness timeout must be greater than zero".to_string(),
            ));
        }
        if self.initial_interval > self.max_interval {
            return Err(SandboxError::Config(format!(
                "initial poll interval {:?} exceeds max interval {:?}",
                self.initial_interval, self.max_interval
            )));
        }
        if self.multiplier < 1.0 {
            return Err(SandboxError::Config(format!(
                "backoff multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(SandboxError::Config(format!(
                "randomization factor must be within 0.0..=1.0, got {}",
                self.randomization_factor
            )));
        }
        Ok(())
    }

    /// The deadline is enforced by the wait itself, so the backoff never gives up on its own.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Poll `check` until it yields a handle, the deadline passes, or `cancel` fires.
///
/// Errors returned by `check` end the wait immediately.
pub async fn wait_until_ready<F, Fut>(
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<SandboxHandle>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<SandboxHandle>>>,
{
    let mut backoff = policy.backoff();
    backoff.reset();

    let poll = async {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(handle) = check().await? {
                debug!(attempts, "Sandbox reported instance {}", handle);
                return Ok(handle);
            }

            let delay = backoff.next_backoff().unwrap_or(policy.max_interval);
            trace!(attempts, ?delay, "Sandbox not ready yet");
            tokio::time::sleep(delay).await;
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SandboxError::Cancelled(
            "stopped waiting for sandbox readiness".to_string(),
        )),
        outcome = tokio::time::timeout(policy.timeout, poll) => match outcome {
            Ok(result) => result,
            Err(_) => Err(SandboxError::ReadinessTimeout {
                seconds: whole_seconds_rounded_up(policy.timeout),
            }),
        },
    }
}

fn whole_seconds_rounded_up(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
