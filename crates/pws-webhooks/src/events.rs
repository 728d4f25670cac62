//! Webhook event kinds.

use serde::{Deserialize, Serialize};

/// Kinds of events an endpoint can subscribe to.
///
/// Serialized in snake_case, which is both the `name` field of the payload
/// and the value stored in an endpoint's `event_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    /// A client-originated event was published on a channel.
    ClientEvent,
    /// A user joined a presence channel.
    MemberAdded,
    /// A user left a presence channel.
    MemberRemoved,
    /// The last connection left a channel.
    ChannelVacated,
    /// The first connection subscribed to a channel.
    ChannelOccupied,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 5] = [
        Self::ClientEvent,
        Self::MemberAdded,
        Self::MemberRemoved,
        Self::ChannelVacated,
        Self::ChannelOccupied,
    ];

    /// Parse from the wire name (e.g. `"member_added"`).
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "client_event" => Some(Self::ClientEvent),
            "member_added" => Some(Self::MemberAdded),
            "member_removed" => Some(Self::MemberRemoved),
            "channel_vacated" => Some(Self::ChannelVacated),
            "channel_occupied" => Some(Self::ChannelOccupied),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClientEvent => "client_event",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::ChannelVacated => "channel_vacated",
            Self::ChannelOccupied => "channel_occupied",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| format!("unknown webhook event: {s}"))
    }
}
