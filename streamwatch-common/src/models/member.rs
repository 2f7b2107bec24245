use chrono::{DateTime, Utc};

use crate::models::stream::{BroadcasterId, StreamState};

/// One guild member's link to a broadcaster. A member has at most one link
/// per guild.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberLink {
    pub guild_id: String,
    pub user_id: String,
    pub broadcaster_id: BroadcasterId,
    pub linked_at: DateTime<Utc>,
}

/// Result of atomically replacing a member's link.
#[derive(Debug, Clone)]
pub struct LinkSwap {
    /// The broadcaster the member was linked to before, if any.
    pub previous: Option<BroadcasterId>,
    /// Stream state of the newly linked broadcaster (created if missing).
    pub stream: StreamState,
}
