//! Stamping, serialization and signing of webhook bodies.

use std::sync::Arc;

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use sha2::Sha256;

use crate::app::WebhookApp;
use crate::clock::{Clock, SystemClock};
use crate::error::WebhookResult;
use crate::events::WebhookEvent;
use crate::payload::ClientEventData;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_APP_KEY: &str = "X-Pusher-Key";
pub const HEADER_SIGNATURE: &str = "X-Pusher-Signature";
pub const USER_AGENT_PRODUCT: &str = "PwsWebhooksClient/1.0";

/// Ordered header set attached to every delivery of one event.
pub type WebhookHeaders = IndexMap<String, String>;

/// HMAC-SHA256 of `payload` keyed by `secret`, hex encoded.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Receiver-side check of an `X-Pusher-Signature` header against the raw body.
///
/// Hex digits may be in either case.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&tag).is_ok()
}

/// A stamped, serialized and signed event, shared by every endpoint that
/// receives it.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    pub event: WebhookEvent,
    pub time_ms: i64,
    /// Exact bytes that were signed; sent verbatim as the request body
    pub body: String,
    pub headers: WebhookHeaders,
}

impl SignedPayload {
    pub fn signature(&self) -> Option<&str> {
        self.headers.get(HEADER_SIGNATURE).map(String::as_str)
    }
}

pub struct Signer {
    user_agent: String,
    clock: Arc<dyn Clock>,
}

impl Signer {
    pub fn new(process_id: &str) -> Self {
        Self {
            user_agent: format!("{USER_AGENT_PRODUCT} (Process: {process_id})"),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn sign<A>(&self, app: &A, payload: ClientEventData) -> WebhookResult<SignedPayload>
    where
        A: WebhookApp + ?Sized,
    {
        let event = payload.name;
        let time_ms = self.clock.now_ms();
        let body = serde_json::to_string(&payload.stamp(time_ms))?;
        let signature = app.sign(body.as_bytes())?;

        let mut headers = WebhookHeaders::with_capacity(5);
        headers.insert("Accept".into(), "application/json".into());
        headers.insert("Content-Type".into(), "application/json".into());
        headers.insert("User-Agent".into(), self.user_agent.clone());
        headers.insert(HEADER_APP_KEY.into(), app.key().to_string());
        headers.insert(HEADER_SIGNATURE.into(), signature);

        Ok(SignedPayload {
            event,
            time_ms,
            body,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::clock::StepClock;

    #[test]
    fn test_sign_and_verify() {
        let secret = "test_secret_12345";
        let payload = b"hello world";
        let sig = sign_payload(secret, payload).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(secret, payload, &sig));
        assert!(!verify_signature("wrong_secret", payload, &sig));
        assert!(!verify_signature(secret, b"wrong payload", &sig));
        assert!(!verify_signature(secret, payload, &sig[..10]));
        assert!(!verify_signature(secret, payload, "not hex"));
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let sig = sign_payload("Jefe", b"what do ya want for nothing?").unwrap();
        assert!(verify_signature(
            "Jefe",
            b"what do ya want for nothing?",
            &sig.to_ascii_uppercase()
        ));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign_payload("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signed_payload_headers() {
        let app = App::new("1", "app-key", "app-secret");
        let signer =
            Signer::new("worker-7").with_clock(Arc::new(StepClock::fixed(1_700_000_000_000)));

        let signed = signer
            .sign(&app, ClientEventData::channel_vacated("room"))
            .unwrap();

        assert_eq!(signed.time_ms, 1_700_000_000_000);
        assert_eq!(
            signed.body,
            r#"{"name":"channel_vacated","channel":"room","time_ms":1700000000000}"#
        );
        let names: Vec<&str> = signed.headers.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["Accept", "Content-Type", "User-Agent", HEADER_APP_KEY, HEADER_SIGNATURE]
        );
        assert_eq!(signed.headers["User-Agent"], "PwsWebhooksClient/1.0 (Process: worker-7)");
        assert_eq!(signed.headers[HEADER_APP_KEY], "app-key");
        assert!(verify_signature(
            "app-secret",
            signed.body.as_bytes(),
            signed.signature().unwrap()
        ));
    }
}
