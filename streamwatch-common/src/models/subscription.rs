use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::models::stream::BroadcasterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionDirection {
    Online,
    Offline,
}

impl SubscriptionDirection {
    pub const ALL: [SubscriptionDirection; 2] = [SubscriptionDirection::Online, SubscriptionDirection::Offline];

    /// EventSub subscription type for this direction.
    pub fn event_type(&self) -> &'static str {
        match self {
            SubscriptionDirection::Online => "stream.online",
            SubscriptionDirection::Offline => "stream.offline",
        }
    }

    pub fn from_event_type(s: &str) -> Option<Self> {
        match s {
            "stream.online" => Some(SubscriptionDirection::Online),
            "stream.offline" => Some(SubscriptionDirection::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Status the provider reports for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Enabled,
    VerificationPending,
    VerificationFailed,
    NotificationFailuresExceeded,
    AuthorizationRevoked,
    ModeratorRemoved,
    UserRemoved,
    VersionRemoved,
    Other(String),
}

impl SubscriptionStatus {
    pub fn from_provider(s: &str) -> Self {
        match s {
            "enabled" => SubscriptionStatus::Enabled,
            "webhook_callback_verification_pending" => SubscriptionStatus::VerificationPending,
            "webhook_callback_verification_failed" => SubscriptionStatus::VerificationFailed,
            "notification_failures_exceeded" => SubscriptionStatus::NotificationFailuresExceeded,
            "authorization_revoked" => SubscriptionStatus::AuthorizationRevoked,
            "moderator_removed" => SubscriptionStatus::ModeratorRemoved,
            "user_removed" => SubscriptionStatus::UserRemoved,
            "version_removed" => SubscriptionStatus::VersionRemoved,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    /// Enabled or still waiting for callback verification. Everything else
    /// will never deliver a notification again.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Enabled | SubscriptionStatus::VerificationPending
        )
    }
}

/// A subscription as listed by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub id: String,
    pub direction: SubscriptionDirection,
    pub broadcaster_id: BroadcasterId,
    pub status: SubscriptionStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// The provider handles held for one broadcaster. Complete when both are
/// present; anything else is a half-created pair.
#[derive(Debug, Clone)]
pub struct SubscriptionHandles {
    pub online: Option<String>,
    pub offline: Option<String>,
    pub touched_at: Instant,
}

impl Default for SubscriptionHandles {
    fn default() -> Self {
        Self {
            online: None,
            offline: None,
            touched_at: Instant::now(),
        }
    }
}

impl SubscriptionHandles {
    pub fn complete(online: String, offline: String) -> Self {
        Self {
            online: Some(online),
            offline: Some(offline),
            touched_at: Instant::now(),
        }
    }

    pub fn get(&self, direction: SubscriptionDirection) -> Option<&String> {
        match direction {
            SubscriptionDirection::Online => self.online.as_ref(),
            SubscriptionDirection::Offline => self.offline.as_ref(),
        }
    }

    pub fn set(&mut self, direction: SubscriptionDirection, id: String) {
        match direction {
            SubscriptionDirection::Online => self.online = Some(id),
            SubscriptionDirection::Offline => self.offline = Some(id),
        }
    }

    pub fn clear(&mut self, direction: SubscriptionDirection) -> Option<String> {
        match direction {
            SubscriptionDirection::Online => self.online.take(),
            SubscriptionDirection::Offline => self.offline.take(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.online.is_some() && self.offline.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_none() && self.offline.is_none()
    }

    pub fn missing(&self) -> Vec<SubscriptionDirection> {
        SubscriptionDirection::ALL
            .into_iter()
            .filter(|d| self.get(*d).is_none())
            .collect()
    }
}

/// A broadcaster's complete pair of "went live" / "went offline" handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPair {
    pub broadcaster_id: BroadcasterId,
    pub online_sub_id: String,
    pub offline_sub_id: String,
}

impl SubscriptionPair {
    pub fn from_handles(broadcaster_id: &BroadcasterId, handles: &SubscriptionHandles) -> Option<Self> {
        Some(Self {
            broadcaster_id: broadcaster_id.clone(),
            online_sub_id: handles.online.clone()?,
            offline_sub_id: handles.offline.clone()?,
        })
    }
}
