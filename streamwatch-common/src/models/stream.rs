use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier the streaming provider assigns to a broadcaster
/// (a Twitch `user_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcasterId(String);

impl BroadcasterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BroadcasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BroadcasterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BroadcasterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A message posted in a guild channel announcing that a broadcaster is live.
/// There is at most one per (broadcaster, guild).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertPost {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub broadcaster_id: BroadcasterId,
    pub is_live: bool,
    pub live_since: Option<DateTime<Utc>>,
    pub alert_posts: HashSet<AlertPost>,
}

impl StreamState {
    pub fn offline(broadcaster_id: BroadcasterId) -> Self {
        Self {
            broadcaster_id,
            is_live: false,
            live_since: None,
            alert_posts: HashSet::new(),
        }
    }

    pub fn post_for_guild(&self, guild_id: &str) -> Option<&AlertPost> {
        self.alert_posts.iter().find(|p| p.guild_id == guild_id)
    }
}
