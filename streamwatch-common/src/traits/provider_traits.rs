use async_trait::async_trait;

use crate::error::Error;
use crate::models::provider::{BroadcasterProfile, LiveStatus};
use crate::models::stream::BroadcasterId;
use crate::models::subscription::{ProviderSubscription, SubscriptionDirection};

/// Push-notification subscriptions held with the streaming provider.
///
/// Implementations map transient failures (timeouts, 5xx, rate limits) to
/// `Error::Unavailable` and a handle the provider no longer knows to
/// `Error::NotFound`.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn create_subscription(
        &self,
        direction: SubscriptionDirection,
        broadcaster_id: &BroadcasterId,
    ) -> Result<ProviderSubscription, Error>;

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error>;

    /// Every `stream.online` / `stream.offline` subscription this
    /// application owns, whatever its status.
    async fn list_subscriptions(&self) -> Result<Vec<ProviderSubscription>, Error>;

    async fn live_status(&self, broadcaster_id: &BroadcasterId) -> Result<LiveStatus, Error>;

    /// Resolves a login or channel URL entered by a member.
    async fn resolve_broadcaster(&self, name_or_url: &str) -> Result<Option<BroadcasterProfile>, Error>;
}
