//! Producer side: formats, signs and fans events out to the `webhooks` queue.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::app::WebhookApp;
use crate::clock::Clock;
use crate::error::WebhookResult;
use crate::filter::interested_endpoints;
use crate::job::{DeliveryJob, WEBHOOK_QUEUE};
use crate::payload::ClientEventData;
use crate::queue::JobQueue;
use crate::signer::Signer;

/// Entry point used by the real-time server to emit webhooks.
///
/// All `notify_*` methods return as soon as the jobs are enqueued; they do
/// no network I/O. The returned count is the number of deliveries queued
/// and can be ignored.
pub struct WebhookSender {
    queue: Arc<dyn JobQueue>,
    signer: Signer,
}

impl WebhookSender {
    /// `process_id` identifies this instance in the `User-Agent` header.
    pub fn new(queue: Arc<dyn JobQueue>, process_id: &str) -> Self {
        Self {
            queue,
            signer: Signer::new(process_id),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.signer = self.signer.with_clock(clock);
        self
    }

    pub fn notify_client_event<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        channel: &str,
        event: &str,
        data: Map<String, Value>,
        socket_id: Option<&str>,
        user_id: Option<&str>,
    ) -> WebhookResult<usize> {
        self.send(
            app,
            ClientEventData::client_event(
                channel,
                event,
                data,
                socket_id.map(str::to_owned),
                user_id.map(str::to_owned),
            ),
        )
    }

    pub fn notify_member_added<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        channel: &str,
        user_id: &str,
    ) -> WebhookResult<usize> {
        self.send(app, ClientEventData::member_added(channel, user_id))
    }

    pub fn notify_member_removed<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        channel: &str,
        user_id: &str,
    ) -> WebhookResult<usize> {
        self.send(app, ClientEventData::member_removed(channel, user_id))
    }

    pub fn notify_channel_vacated<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        channel: &str,
    ) -> WebhookResult<usize> {
        self.send(app, ClientEventData::channel_vacated(channel))
    }

    pub fn notify_channel_occupied<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        channel: &str,
    ) -> WebhookResult<usize> {
        self.send(app, ClientEventData::channel_occupied(channel))
    }

    /// Sign `payload` once and enqueue one job per interested endpoint.
    pub fn send<A: WebhookApp + ?Sized>(
        &self,
        app: &A,
        payload: ClientEventData,
    ) -> WebhookResult<usize> {
        let event = payload.name;
        let mut endpoints = interested_endpoints(app.webhooks(), event).peekable();
        if endpoints.peek().is_none() {
            return Ok(0);
        }

        let signed = self.signer.sign(app, payload)?;

        let mut enqueued = 0;
        let mut last_error = None;
        for endpoint in endpoints {
            match self
                .queue
                .enqueue(WEBHOOK_QUEUE, DeliveryJob::new(endpoint, &signed))
            {
                Ok(()) => enqueued += 1,
                Err(e) => {
                    error!(
                        app_key = app.key(),
                        url = %endpoint.url,
                        event = %event,
                        error = %e,
                        "Failed to enqueue webhook delivery"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if enqueued == 0 => Err(e.into()),
            _ => {
                debug!(
                    app_key = app.key(),
                    event = %event,
                    time_ms = signed.time_ms,
                    count = enqueued,
                    "Webhook deliveries enqueued"
                );
                Ok(enqueued)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::app::{App, WebhookEndpoint};
    use crate::clock::StepClock;
    use crate::error::WebhookError;
    use crate::events::WebhookEvent;
    use crate::queue::{JobHandler, QueueError};
    use crate::signer::{HEADER_SIGNATURE, verify_signature};

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<(String, DeliveryJob)>>,
        closed: bool,
    }

    impl RecordingQueue {
        fn jobs(&self) -> Vec<DeliveryJob> {
            self.jobs.lock().unwrap().iter().map(|(_, j)| j.clone()).collect()
        }
    }

    impl JobQueue for RecordingQueue {
        fn enqueue(&self, queue: &str, job: DeliveryJob) -> Result<(), QueueError> {
            if self.closed {
                return Err(QueueError::Closed(queue.to_string()));
            }
            self.jobs.lock().unwrap().push((queue.to_string(), job));
            Ok(())
        }

        fn enqueue_delayed(
            &self,
            queue: &str,
            job: DeliveryJob,
            _delay: Duration,
        ) -> Result<(), QueueError> {
            self.enqueue(queue, job)
        }

        fn process(&self, _queue: &str, _handler: Arc<dyn JobHandler>) -> Result<(), QueueError> {
            Ok(())
        }
    }

    struct BrokenApp {
        webhooks: Vec<WebhookEndpoint>,
    }

    impl WebhookApp for BrokenApp {
        fn key(&self) -> &str {
            "broken"
        }

        fn webhooks(&self) -> &[WebhookEndpoint] {
            &self.webhooks
        }

        fn sign(&self, _payload: &[u8]) -> WebhookResult<String> {
            Err(WebhookError::Signing {
                app_key: "broken".into(),
                reason: "secret unavailable".into(),
            })
        }
    }

    fn app() -> App {
        App::new("1", "app-key", "app-secret")
            .with_webhook(WebhookEndpoint::new("https://a", [WebhookEvent::ChannelOccupied]))
            .with_webhook(WebhookEndpoint::new("https://b", [WebhookEvent::MemberAdded]))
            .with_webhook(WebhookEndpoint::new(
                "https://c",
                [WebhookEvent::ClientEvent, WebhookEvent::MemberAdded],
            ))
    }

    fn sender(queue: Arc<RecordingQueue>) -> WebhookSender {
        WebhookSender::new(queue, "test-process").with_clock(Arc::new(StepClock::new(1_000, 1)))
    }

    #[test]
    fn test_channel_occupied_scenario() {
        let queue = Arc::new(RecordingQueue::default());
        let count = sender(queue.clone())
            .notify_channel_occupied(&app(), "presence-room")
            .unwrap();

        assert_eq!(count, 1);
        let recorded = queue.jobs.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        let (queue_name, job) = &recorded[0];
        assert_eq!(queue_name, WEBHOOK_QUEUE);
        assert_eq!(job.endpoint.url, "https://a");
        assert_eq!(
            serde_json::from_str::<Value>(&job.payload).unwrap(),
            json!({"name": "channel_occupied", "channel": "presence-room", "time_ms": 1000})
        );
    }

    #[test]
    fn test_fan_out_shares_timestamp_and_signature() {
        let queue = Arc::new(RecordingQueue::default());
        let count = sender(queue.clone())
            .notify_member_added(&app(), "presence-room", "u1")
            .unwrap();

        assert_eq!(count, 2);
        let jobs = queue.jobs();
        let urls: Vec<&str> = jobs.iter().map(|j| j.endpoint.url.as_str()).collect();
        assert_eq!(urls, ["https://b", "https://c"]);
        assert_eq!(jobs[0].payload, jobs[1].payload);
        assert_eq!(jobs[0].headers, jobs[1].headers);
        assert!(verify_signature(
            "app-secret",
            jobs[0].payload.as_bytes(),
            &jobs[0].headers[HEADER_SIGNATURE]
        ));
    }

    #[test]
    fn test_client_event_user_id_follows_channel_type() {
        let queue = Arc::new(RecordingQueue::default());
        let sender = sender(queue.clone());
        let mut data = Map::new();
        data.insert("foo".into(), json!(1));

        sender
            .notify_client_event(
                &app(),
                "presence-room",
                "client-typing",
                data.clone(),
                Some("s1"),
                Some("u1"),
            )
            .unwrap();
        sender
            .notify_client_event(&app(), "room", "client-typing", data, Some("s1"), Some("u1"))
            .unwrap();

        let jobs = queue.jobs();
        let presence: Value = serde_json::from_str(&jobs[0].payload).unwrap();
        let public: Value = serde_json::from_str(&jobs[1].payload).unwrap();
        assert_eq!(
            presence,
            json!({
                "name": "client_event",
                "channel": "presence-room",
                "event": "client-typing",
                "data": {"foo": 1},
                "socket_id": "s1",
                "user_id": "u1",
                "time_ms": 1000,
            })
        );
        assert!(public.get("user_id").is_none());
        assert_eq!(public["socket_id"], "s1");
    }

    #[test]
    fn test_no_interested_endpoint_enqueues_nothing() {
        let queue = Arc::new(RecordingQueue::default());
        let count = sender(queue.clone())
            .notify_channel_vacated(&app(), "room")
            .unwrap();
        assert_eq!(count, 0);
        assert!(queue.jobs().is_empty());
    }

    #[test]
    fn test_repeated_notify_is_not_idempotent() {
        let queue = Arc::new(RecordingQueue::default());
        let sender = sender(queue.clone());
        sender.notify_channel_occupied(&app(), "room").unwrap();
        sender.notify_channel_occupied(&app(), "room").unwrap();

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 2);
        let first: Value = serde_json::from_str(&jobs[0].payload).unwrap();
        let second: Value = serde_json::from_str(&jobs[1].payload).unwrap();
        assert_ne!(first["time_ms"], second["time_ms"]);
    }

    #[test]
    fn test_signing_failure_is_reported_and_nothing_enqueued() {
        let queue = Arc::new(RecordingQueue::default());
        let broken = BrokenApp {
            webhooks: vec![WebhookEndpoint::new("https://a", [WebhookEvent::MemberRemoved])],
        };
        let err = sender(queue.clone())
            .notify_member_removed(&broken, "presence-room", "u1")
            .unwrap_err();

        assert!(matches!(err, WebhookError::Signing { .. }));
        assert!(queue.jobs().is_empty());
    }

    #[test]
    fn test_closed_queue_is_reported() {
        let queue = Arc::new(RecordingQueue {
            closed: true,
            ..Default::default()
        });
        let err = sender(queue)
            .notify_channel_occupied(&app(), "room")
            .unwrap_err();
        assert!(matches!(err, WebhookError::Queue(QueueError::Closed(_))));
    }

    #[test]
    fn test_works_with_trait_objects() {
        let queue = Arc::new(RecordingQueue::default());
        let app: Box<dyn WebhookApp> = Box::new(app());
        let count = sender(queue)
            .notify_member_removed(app.as_ref(), "presence-room", "u1")
            .unwrap();
        assert_eq!(count, 0);
    }
}
