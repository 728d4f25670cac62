//! Consumer side of the `webhooks` queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::job::{DeliveryJob, WEBHOOK_QUEUE};
use crate::policy::{
    AckAlways, DeadLetter, DeadLetterSink, DeliveryPolicy, LogDeadLetters, PolicyDecision,
};
use crate::queue::{Ack, JobHandler, JobQueue, QueueError};
use crate::transport::{DeliveryResult, WebhookTransport};

/// Completion signal for one handled job.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub job: DeliveryJob,
    pub result: DeliveryResult,
    pub decision: PolicyDecision,
}

/// Performs the HTTP POST for each dequeued job and acknowledges it.
pub struct DeliveryWorker {
    transport: Arc<dyn WebhookTransport>,
    queue: Arc<dyn JobQueue>,
    policy: Arc<dyn DeliveryPolicy>,
    dead_letters: Arc<dyn DeadLetterSink>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
}

impl DeliveryWorker {
    pub fn new(transport: Arc<dyn WebhookTransport>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            transport,
            queue,
            policy: Arc::new(AckAlways),
            dead_letters: Arc::new(LogDeadLetters),
            reports: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DeliveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Send a [`DeliveryReport`] for every handled job to `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Subscribe this worker to the `webhooks` queue.
    pub fn start(self: Arc<Self>) -> Result<(), QueueError> {
        let queue = self.queue.clone();
        queue.process(WEBHOOK_QUEUE, self)
    }

    /// One delivery attempt.
    pub async fn deliver(&self, job: &DeliveryJob) -> DeliveryResult {
        let result = self
            .transport
            .post(&job.endpoint.url, &job.headers, &job.payload)
            .await;

        if result.success {
            debug!(
                url = %job.endpoint.url,
                status = ?result.http_status,
                elapsed_ms = result.response_time_ms,
                attempt = job.attempt,
                "Webhook delivered"
            );
        } else {
            warn!(
                url = %job.endpoint.url,
                status = ?result.http_status,
                error = ?result.error,
                elapsed_ms = result.response_time_ms,
                attempt = job.attempt,
                "Webhook delivery failed"
            );
        }
        result
    }

    /// Apply the policy decision for a finished attempt.
    fn settle(&self, job: &DeliveryJob, result: &DeliveryResult) -> PolicyDecision {
        let decision = self.policy.decide(job, result);
        match decision {
            PolicyDecision::Ack => {}
            PolicyDecision::Retry { after } => {
                if let Err(e) = self
                    .queue
                    .enqueue_delayed(WEBHOOK_QUEUE, job.next_attempt(), after)
                {
                    error!(
                        url = %job.endpoint.url,
                        attempt = job.attempt,
                        error = %e,
                        "Failed to schedule retry, falling back to dead-letter"
                    );
                    self.dead_letters.store(DeadLetter {
                        job: job.clone(),
                        result: result.clone(),
                    });
                    return PolicyDecision::DeadLetter;
                }
                debug!(
                    url = %job.endpoint.url,
                    attempt = job.attempt + 1,
                    ?after,
                    "Webhook retry scheduled"
                );
            }
            PolicyDecision::DeadLetter => {
                self.dead_letters.store(DeadLetter {
                    job: job.clone(),
                    result: result.clone(),
                });
            }
        }
        decision
    }
}

#[async_trait]
impl JobHandler for DeliveryWorker {
    async fn handle(&self, job: DeliveryJob, ack: Ack) {
        let result = self.deliver(&job).await;
        let decision = self.settle(&job, &result);

        if let Some(reports) = &self.reports {
            let _ = reports.send(DeliveryReport {
                job,
                result,
                decision,
            });
        }
        ack.ack();
    }
}
