// File: streamwatch-core/src/platforms/twitch/provider.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use streamwatch_common::models::provider::{BroadcasterProfile, LiveStatus};
use streamwatch_common::models::stream::BroadcasterId;
use streamwatch_common::models::subscription::{ProviderSubscription, SubscriptionDirection};
use streamwatch_common::traits::provider_traits::SubscriptionProvider;

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;
use crate::platforms::twitch::requests::{eventsub, stream, users};

static LOGIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"?(?:(?:https?://)?(?:(?:www|go|m)\.)?twitch\.tv/)?([A-Za-z0-9_]{4,25})/?"?$"#)
        .expect("hardcoded login regex is invalid")
});

/// Extracts a Twitch login from a bare login or a channel URL.
pub fn parse_login(name_or_url: &str) -> Option<String> {
    LOGIN_RE
        .captures(name_or_url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// EventSub subscriptions over the webhook transport plus the Helix lookups
/// the reconciler and link manager need.
pub struct TwitchSubscriptionProvider {
    client: Arc<TwitchHelixClient>,
    callback_url: String,
    secret: String,
}

impl TwitchSubscriptionProvider {
    pub fn new(client: Arc<TwitchHelixClient>, callback_url: &str, secret: &str) -> Self {
        Self {
            client,
            callback_url: callback_url.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[async_trait]
impl SubscriptionProvider for TwitchSubscriptionProvider {
    async fn create_subscription(
        &self,
        direction: SubscriptionDirection,
        broadcaster_id: &BroadcasterId,
    ) -> Result<ProviderSubscription, Error> {
        let data = eventsub::create_subscription(
            &self.client,
            direction.event_type(),
            broadcaster_id.as_str(),
            &self.callback_url,
            &self.secret,
        )
            .await?;

        info!("[EventSub] created {} subscription {} for {}", direction, data.id, broadcaster_id);
        data.to_provider_subscription().ok_or_else(|| {
            Error::Platform(format!("create_subscription: unexpected response type {}", data.sub_type))
        })
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error> {
        eventsub::delete_subscription(&self.client, subscription_id).await?;
        debug!("[EventSub] deleted subscription {}", subscription_id);
        Ok(())
    }

    async fn list_subscriptions(&self) -> Result<Vec<ProviderSubscription>, Error> {
        let all = eventsub::list_subscriptions(&self.client).await?;
        let total = all.len();
        let subs: Vec<ProviderSubscription> = all
            .iter()
            .filter_map(|d| d.to_provider_subscription())
            .collect();
        debug!("[EventSub] {} subscriptions listed, {} stream online/offline", total, subs.len());
        Ok(subs)
    }

    async fn live_status(&self, broadcaster_id: &BroadcasterId) -> Result<LiveStatus, Error> {
        let Some(s) = stream::get_stream(&self.client, broadcaster_id.as_str()).await? else {
            return Ok(LiveStatus::Offline);
        };
        if s.type_field != "live" {
            return Ok(LiveStatus::Unknown);
        }

        let started_at = s
            .started_at
            .as_deref()
            .and_then(|t| match DateTime::parse_from_rfc3339(t) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(e) => {
                    warn!("unparseable started_at '{}' for {}: {}", t, broadcaster_id, e);
                    None
                }
            });
        Ok(LiveStatus::Live { started_at })
    }

    async fn resolve_broadcaster(&self, name_or_url: &str) -> Result<Option<BroadcasterProfile>, Error> {
        let Some(login) = parse_login(name_or_url) else {
            debug!("'{}' is not a Twitch login or channel URL", name_or_url);
            return Ok(None);
        };

        Ok(users::get_user_by_login(&self.client, &login)
            .await?
            .map(|u| BroadcasterProfile {
                id: BroadcasterId::new(u.id),
                login: u.login,
                display_name: u.display_name,
            }))
    }
}
