//! Webhook payloads, one constructor per event kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::is_presence_channel;
use crate::events::WebhookEvent;

/// Body of a webhook before it is stamped with `time_ms`.
///
/// Only the fields relevant to `name` are populated; the rest are omitted
/// from the JSON rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEventData {
    pub name: WebhookEvent,
    pub channel: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ClientEventData {
    fn bare(name: WebhookEvent, channel: impl Into<String>) -> Self {
        Self {
            name,
            channel: channel.into(),
            event: None,
            data: None,
            socket_id: None,
            user_id: None,
        }
    }

    /// A client event. `user_id` is only attached on presence channels, even
    /// when the caller knows it.
    pub fn client_event(
        channel: impl Into<String>,
        event: impl Into<String>,
        data: Map<String, Value>,
        socket_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        let channel = channel.into();
        let user_id = user_id.filter(|_| is_presence_channel(&channel));
        Self {
            event: Some(event.into()),
            data: Some(data),
            socket_id,
            user_id,
            ..Self::bare(WebhookEvent::ClientEvent, channel)
        }
    }

    pub fn member_added(channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::bare(WebhookEvent::MemberAdded, channel)
        }
    }

    pub fn member_removed(channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::bare(WebhookEvent::MemberRemoved, channel)
        }
    }

    pub fn channel_vacated(channel: impl Into<String>) -> Self {
        Self::bare(WebhookEvent::ChannelVacated, channel)
    }

    pub fn channel_occupied(channel: impl Into<String>) -> Self {
        Self::bare(WebhookEvent::ChannelOccupied, channel)
    }

    /// Attach the dispatch timestamp.
    pub fn stamp(self, time_ms: i64) -> StampedPayload {
        StampedPayload {
            data: self,
            time_ms,
        }
    }
}

/// The body that is signed and sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedPayload {
    #[serde(flatten)]
    pub data: ClientEventData,
    pub time_ms: i64,
}
