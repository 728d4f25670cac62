use crate::app::WebhookEndpoint;
use crate::events::WebhookEvent;

/// Endpoints subscribed to `event`, in registration order.
pub fn interested_endpoints(
    endpoints: &[WebhookEndpoint],
    event: WebhookEvent,
) -> impl Iterator<Item = &WebhookEndpoint> {
    endpoints.iter().filter(move |endpoint| endpoint.wants(event))
}
