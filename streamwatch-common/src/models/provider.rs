use chrono::{DateTime, Utc};

use crate::models::stream::BroadcasterId;

/// Provider-side view of whether a broadcaster is streaming right now.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveStatus {
    Live { started_at: Option<DateTime<Utc>> },
    Offline,
    /// The provider answered but could not say. Treated as offline.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcasterProfile {
    pub id: BroadcasterId,
    pub login: String,
    pub display_name: String,
}

/// A pushed (or polled) presence change for one broadcaster.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    Online {
        broadcaster_id: BroadcasterId,
        started_at: DateTime<Utc>,
    },
    Offline {
        broadcaster_id: BroadcasterId,
    },
}

impl StreamNotification {
    pub fn broadcaster_id(&self) -> &BroadcasterId {
        match self {
            StreamNotification::Online { broadcaster_id, .. } => broadcaster_id,
            StreamNotification::Offline { broadcaster_id } => broadcaster_id,
        }
    }
}
