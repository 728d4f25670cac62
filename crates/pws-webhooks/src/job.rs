use serde::{Deserialize, Serialize};

use crate::app::WebhookEndpoint;
use crate::signer::{SignedPayload, WebhookHeaders};

/// Name of the queue carrying webhook deliveries.
pub const WEBHOOK_QUEUE: &str = "webhooks";

/// One delivery of one event to one endpoint.
///
/// Everything needed to perform the POST is in the job; the secret is not,
/// since the signature is already computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub endpoint: WebhookEndpoint,
    pub headers: WebhookHeaders,
    /// Serialized body, byte-identical to what was signed
    pub payload: String,
    /// Delivery attempt, 0 for the first
    #[serde(default)]
    pub attempt: u32,
}

impl DeliveryJob {
    pub fn new(endpoint: &WebhookEndpoint, signed: &SignedPayload) -> Self {
        Self {
            endpoint: endpoint.clone(),
            headers: signed.headers.clone(),
            payload: signed.body.clone(),
            attempt: 0,
        }
    }

    /// Copy of this job for the next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}
