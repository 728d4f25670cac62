//! What happens to a job after its delivery attempt.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::job::DeliveryJob;
use crate::transport::DeliveryResult;

/// Retry delays in seconds (exponential backoff).
pub const DEFAULT_RETRY_DELAYS_SECS: [u64; 5] = [5, 30, 120, 600, 1800];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Job is done.
    Ack,
    /// Enqueue the next attempt after the delay, then ack this one.
    Retry { after: Duration },
    /// Hand the job to the dead-letter sink, then ack.
    DeadLetter,
}

/// Decides the fate of a job given the outcome of its delivery.
pub trait DeliveryPolicy: Send + Sync {
    fn decide(&self, job: &DeliveryJob, result: &DeliveryResult) -> PolicyDecision;
}

/// Best-effort, at-most-once delivery: every job is acknowledged after one
/// attempt whatever the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckAlways;

impl DeliveryPolicy for AckAlways {
    fn decide(&self, _job: &DeliveryJob, _result: &DeliveryResult) -> PolicyDecision {
        PolicyDecision::Ack
    }
}

/// Retries failed deliveries with growing delays and dead-letters them once
/// `max_attempts` retries are exhausted.
#[derive(Debug, Clone)]
pub struct RetryWithBackoff {
    max_attempts: u32,
    delays: Vec<Duration>,
}

impl RetryWithBackoff {
    /// The last delay is reused when `delays` is shorter than `max_attempts`.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            delays,
        }
    }

    pub fn from_secs(max_attempts: u32, delays_secs: &[u64]) -> Self {
        Self::new(
            max_attempts,
            delays_secs.iter().copied().map(Duration::from_secs).collect(),
        )
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryWithBackoff {
    fn default() -> Self {
        Self::from_secs(DEFAULT_MAX_ATTEMPTS, &DEFAULT_RETRY_DELAYS_SECS)
    }
}

impl DeliveryPolicy for RetryWithBackoff {
    fn decide(&self, job: &DeliveryJob, result: &DeliveryResult) -> PolicyDecision {
        if result.success {
            PolicyDecision::Ack
        } else if job.attempt < self.max_attempts {
            PolicyDecision::Retry {
                after: self.delay_for(job.attempt),
            }
        } else {
            PolicyDecision::DeadLetter
        }
    }
}

/// A job whose delivery was given up on.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: DeliveryJob,
    pub result: DeliveryResult,
}

/// Where dead-lettered jobs end up.
pub trait DeadLetterSink: Send + Sync {
    fn store(&self, letter: DeadLetter);
}

/// Logs dead letters and discards them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeadLetters;

impl DeadLetterSink for LogDeadLetters {
    fn store(&self, letter: DeadLetter) {
        tracing::error!(
            url = %letter.job.endpoint.url,
            attempt = letter.job.attempt,
            http_status = ?letter.result.http_status,
            error = ?letter.result.error,
            "Webhook delivery dead-lettered, dropping"
        );
    }
}

/// Keeps dead letters in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for MemoryDeadLetters {
    fn store(&self, letter: DeadLetter) {
        tracing::warn!(
            url = %letter.job.endpoint.url,
            attempt = letter.job.attempt,
            "Webhook delivery dead-lettered"
        );
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::WebhookEndpoint;
    use crate::signer::WebhookHeaders;

    fn job(attempt: u32) -> DeliveryJob {
        DeliveryJob {
            endpoint: WebhookEndpoint::new("https://a", []),
            headers: WebhookHeaders::new(),
            payload: "{}".into(),
            attempt,
        }
    }

    #[test]
    fn test_ack_always_ignores_outcome() {
        let failed = DeliveryResult::failure("connection refused", 3);
        assert_eq!(AckAlways.decide(&job(0), &failed), PolicyDecision::Ack);
        assert_eq!(
            AckAlways.decide(&job(0), &DeliveryResult::success(200, 3)),
            PolicyDecision::Ack
        );
    }

    #[test]
    fn test_backoff_schedule_then_dead_letter() {
        let policy = RetryWithBackoff::default();
        let failed = DeliveryResult::http_failure(500, "HTTP 500", 1);

        let delays: Vec<PolicyDecision> = (0..5).map(|n| policy.decide(&job(n), &failed)).collect();
        assert_eq!(
            delays,
            [5, 30, 120, 600, 1800].map(|s| PolicyDecision::Retry {
                after: Duration::from_secs(s)
            })
        );
        assert_eq!(policy.decide(&job(5), &failed), PolicyDecision::DeadLetter);
    }

    #[test]
    fn test_backoff_acks_success() {
        let policy = RetryWithBackoff::default();
        assert_eq!(
            policy.decide(&job(3), &DeliveryResult::success(204, 1)),
            PolicyDecision::Ack
        );
    }

    #[test]
    fn test_short_delay_list_reuses_last_delay() {
        let policy = RetryWithBackoff::from_secs(4, &[1, 2]);
        let failed = DeliveryResult::failure("timeout", 1);
        assert_eq!(
            policy.decide(&job(3), &failed),
            PolicyDecision::Retry {
                after: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_memory_dead_letters_keep_jobs() {
        let sink = MemoryDeadLetters::new();
        assert!(sink.is_empty());
        sink.store(DeadLetter {
            job: job(5),
            result: DeliveryResult::failure("timeout", 1),
        });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].job.attempt, 5);
    }
}
