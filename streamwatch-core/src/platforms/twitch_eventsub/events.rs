// File: streamwatch-core/src/platforms/twitch_eventsub/events.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use streamwatch_common::models::provider::StreamNotification;
use streamwatch_common::models::stream::BroadcasterId;
use streamwatch_common::models::subscription::{ProviderSubscription, SubscriptionDirection, SubscriptionStatus};

use crate::Error;

/// Subscription metadata as Twitch sends it, both in Helix responses and in
/// webhook envelopes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionData {
    pub id: String,
    #[serde(rename = "type")]
    pub sub_type: String,
    pub version: String,
    pub status: String,
    #[serde(default)]
    pub cost: u32,

    #[serde(default)]
    pub condition: serde_json::Value,

    #[serde(default)]
    pub transport: serde_json::Value,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SubscriptionData {
    pub fn broadcaster_user_id(&self) -> Option<&str> {
        self.condition.get("broadcaster_user_id").and_then(|v| v.as_str())
    }

    /// `None` for subscription types other than stream online/offline.
    pub fn to_provider_subscription(&self) -> Option<ProviderSubscription> {
        let direction = SubscriptionDirection::from_event_type(&self.sub_type)?;
        let broadcaster_id = self.broadcaster_user_id()?;
        Some(ProviderSubscription {
            id: self.id.clone(),
            direction,
            broadcaster_id: BroadcasterId::from(broadcaster_id),
            status: SubscriptionStatus::from_provider(&self.status),
            created_at: self.created_at,
        })
    }
}

/// Body of a webhook `notification`: `{ "subscription": {...}, "event": {...} }`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubNotificationEnvelope {
    pub subscription: SubscriptionData,
    #[serde(default)]
    pub event: serde_json::Value,
    /// Only present on `webhook_callback_verification`.
    #[serde(default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOnline {
    #[serde(default)]
    pub id: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    #[serde(default)]
    pub r#type: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOffline {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
}

/// Interprets a notification envelope. `Ok(None)` for types we do not
/// subscribe to.
pub fn parse_stream_notification(env: &EventSubNotificationEnvelope) -> Result<Option<StreamNotification>, Error> {
    match SubscriptionDirection::from_event_type(&env.subscription.sub_type) {
        Some(SubscriptionDirection::Online) => {
            let evt: StreamOnline = serde_json::from_value(env.event.clone())?;
            Ok(Some(StreamNotification::Online {
                broadcaster_id: BroadcasterId::new(evt.broadcaster_user_id),
                started_at: evt.started_at,
            }))
        }
        Some(SubscriptionDirection::Offline) => {
            let evt: StreamOffline = serde_json::from_value(env.event.clone())?;
            Ok(Some(StreamNotification::Offline {
                broadcaster_id: BroadcasterId::new(evt.broadcaster_user_id),
            }))
        }
        None => Ok(None),
    }
}
