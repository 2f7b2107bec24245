// File: streamwatch-core/src/services/link_manager.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use streamwatch_common::models::stream::BroadcasterId;
use streamwatch_common::traits::provider_traits::SubscriptionProvider;
use streamwatch_common::traits::repository_traits::StreamRegistry;

use crate::Error;
use crate::services::live_state::LiveStateDispatcher;
use crate::services::subscriptions::SubscriptionReconciler;
use crate::utils::KeyedLocks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub previous: Option<BroadcasterId>,
    pub broadcaster_id: BroadcasterId,
    pub is_live: bool,
}

/// Links guild members to broadcasters and keeps subscriptions, stream
/// state and alert posts in step with the links.
pub struct LinkManager {
    registry: Arc<dyn StreamRegistry>,
    provider: Arc<dyn SubscriptionProvider>,
    reconciler: Arc<SubscriptionReconciler>,
    dispatcher: Arc<LiveStateDispatcher>,
    locks: KeyedLocks<(String, String)>,
}

impl LinkManager {
    pub fn new(
        registry: Arc<dyn StreamRegistry>,
        provider: Arc<dyn SubscriptionProvider>,
        reconciler: Arc<SubscriptionReconciler>,
        dispatcher: Arc<LiveStateDispatcher>,
    ) -> Self {
        Self {
            registry,
            provider,
            reconciler,
            dispatcher,
            locks: KeyedLocks::new(),
        }
    }

    /// Resolves a login or channel URL and links the member to it.
    pub async fn register_link(&self, guild_id: &str, member_id: &str, name_or_url: &str) -> Result<LinkOutcome, Error> {
        let profile = self
            .provider
            .resolve_broadcaster(name_or_url)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no Twitch channel matches '{}'", name_or_url)))?;

        info!(
            "linking {} in {} to {} ({})",
            member_id, guild_id, profile.login, profile.id
        );
        self.set_link(guild_id, member_id, &profile.id).await
    }

    pub async fn set_link(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<LinkOutcome, Error> {
        let _guard = self.locks.lock(&(guild_id.to_string(), member_id.to_string())).await;

        let swap = self.registry.swap_member_link(guild_id, member_id, broadcaster_id).await?;
        let new_is_live = swap.stream.is_live;

        if let Some(old) = swap.previous.as_ref().filter(|old| *old != broadcaster_id) {
            self.release(guild_id, member_id, old, new_is_live).await?;
        }

        self.reconciler.ensure_watched(broadcaster_id).await?;

        if new_is_live {
            if let Err(e) = self.dispatcher.apply_for_new_link(guild_id, member_id, broadcaster_id).await {
                warn!("live effects for new link {} -> {} failed: {}", member_id, broadcaster_id, e);
            }
        } else if let Err(e) = self.dispatcher.force_poll(broadcaster_id).await {
            warn!("could not poll {} after linking: {}", broadcaster_id, e);
        }

        Ok(LinkOutcome {
            previous: swap.previous,
            broadcaster_id: broadcaster_id.clone(),
            is_live: new_is_live,
        })
    }

    /// Removes the member's link, returning the broadcaster it pointed at.
    pub async fn unlink(&self, guild_id: &str, member_id: &str) -> Result<Option<BroadcasterId>, Error> {
        let _guard = self.locks.lock(&(guild_id.to_string(), member_id.to_string())).await;

        let previous = self.registry.remove_member_link(guild_id, member_id).await?;
        match &previous {
            Some(old) => {
                info!("unlinked {} in {} from {}", member_id, guild_id, old);
                self.release(guild_id, member_id, old, false).await?;
            }
            None => debug!("{} in {} had no link", member_id, guild_id),
        }
        Ok(previous)
    }

    /// Cleans up after a member stopped linking `old`.
    async fn release(
        &self,
        guild_id: &str,
        member_id: &str,
        old: &BroadcasterId,
        new_is_live: bool,
    ) -> Result<(), Error> {
        let remaining = self.registry.list_links_for_broadcaster(old, None).await?;
        let remaining_in_guild = remaining.iter().any(|l| l.guild_id == guild_id);
        let old_was_live = self
            .registry
            .get_stream(old)
            .await?
            .map(|s| s.is_live)
            .unwrap_or(false);

        if remaining.is_empty() {
            if let Err(e) = self.reconciler.ensure_unwatched(old).await {
                warn!("could not unwatch {}; the next resync retries: {}", old, e);
            }
        }

        if !remaining_in_guild {
            if let Err(e) = self.dispatcher.rules().remove_guild_alert_posts(guild_id, old).await {
                warn!("could not remove alert posts for {} in {}: {}", old, guild_id, e);
            }
        }

        if old_was_live && !new_is_live {
            if let Err(e) = self.dispatcher.revert_for_member(guild_id, member_id, old).await {
                warn!("could not revoke live roles of {} in {}: {}", member_id, guild_id, e);
            }
        }

        if remaining.is_empty() {
            self.registry.delete_stream(old).await?;
            debug!("dropped stream state for {}", old);
        }
        Ok(())
    }
}
