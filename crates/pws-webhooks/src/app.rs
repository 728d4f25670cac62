//! Application registry view consumed by the dispatch engine.

use serde::{Deserialize, Serialize};

use crate::error::{WebhookError, WebhookResult};
use crate::events::WebhookEvent;
use crate::signer::sign_payload;

/// A registered webhook destination.
///
/// Event kind names this engine does not emit (`subscription_count`,
/// `cache_miss`, ...) are kept in `ignored_event_types` and never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EndpointRecord", into = "EndpointRecord")]
pub struct WebhookEndpoint {
    pub url: String,

    /// Event kinds this endpoint wants to receive
    pub event_types: Vec<WebhookEvent>,

    pub ignored_event_types: Vec<String>,
}

/// Stored form of an endpoint: event kinds as plain names.
#[derive(Serialize, Deserialize)]
struct EndpointRecord {
    url: String,
    #[serde(default)]
    event_types: Vec<String>,
}

impl From<EndpointRecord> for WebhookEndpoint {
    fn from(record: EndpointRecord) -> Self {
        let mut event_types = Vec::new();
        let mut ignored_event_types = Vec::new();
        for name in record.event_types {
            match WebhookEvent::parse_str(&name) {
                Some(event) => event_types.push(event),
                None => ignored_event_types.push(name),
            }
        }
        Self {
            url: record.url,
            event_types,
            ignored_event_types,
        }
    }
}

impl From<WebhookEndpoint> for EndpointRecord {
    fn from(endpoint: WebhookEndpoint) -> Self {
        let event_types = endpoint
            .event_types
            .iter()
            .map(|event| event.as_str().to_string())
            .chain(endpoint.ignored_event_types)
            .collect();
        Self {
            url: endpoint.url,
            event_types,
        }
    }
}

impl WebhookEndpoint {
    pub fn new(
        url: impl Into<String>,
        event_types: impl IntoIterator<Item = WebhookEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            event_types: event_types.into_iter().collect(),
            ignored_event_types: Vec::new(),
        }
    }

    pub fn wants(&self, event: WebhookEvent) -> bool {
        self.event_types.contains(&event)
    }
}

/// What the dispatch engine needs from an application.
pub trait WebhookApp: Send + Sync {
    /// Public application key, sent as `X-Pusher-Key`.
    fn key(&self) -> &str;

    /// Registered endpoints in registration order.
    fn webhooks(&self) -> &[WebhookEndpoint];

    /// Signature over the exact bytes of a webhook body.
    fn sign(&self, payload: &[u8]) -> WebhookResult<String>;
}

/// Application backed by a shared secret (HMAC-SHA256).
#[derive(Clone, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub id: String,
    pub key: String,
    pub secret: String,
    #[serde(default)]
    pub webhooks: Vec<WebhookEndpoint>,
}

impl App {
    pub fn new(id: impl Into<String>, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            secret: secret.into(),
            webhooks: Vec::new(),
        }
    }

    pub fn with_webhook(mut self, endpoint: WebhookEndpoint) -> Self {
        self.webhooks.push(endpoint);
        self
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("secret", &"***")
            .field("webhooks", &self.webhooks)
            .finish()
    }
}

impl WebhookApp for App {
    fn key(&self) -> &str {
        &self.key
    }

    fn webhooks(&self) -> &[WebhookEndpoint] {
        &self.webhooks
    }

    fn sign(&self, payload: &[u8]) -> WebhookResult<String> {
        if self.secret.is_empty() {
            return Err(WebhookError::Signing {
                app_key: self.key.clone(),
                reason: "app has no secret".into(),
            });
        }
        sign_payload(&self.secret, payload).map_err(|e| WebhookError::Signing {
            app_key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}
