/// Prefix that marks a channel as carrying per-user presence information.
pub const PRESENCE_PREFIX: &str = "presence-";

/// Whether the channel is a presence channel.
pub fn is_presence_channel(channel: &str) -> bool {
    channel.starts_with(PRESENCE_PREFIX)
}
