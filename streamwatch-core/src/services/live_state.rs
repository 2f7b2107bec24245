// File: streamwatch-core/src/services/live_state.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use streamwatch_common::models::batch::BatchReport;
use streamwatch_common::models::provider::{LiveStatus, StreamNotification};
use streamwatch_common::models::stream::BroadcasterId;
use streamwatch_common::traits::provider_traits::SubscriptionProvider;
use streamwatch_common::traits::repository_traits::StreamRegistry;

use crate::Error;
use crate::services::roles::RoleRuleEngine;
use crate::utils::KeyedLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveTransition {
    WentLive,
    WentOffline,
    Unchanged,
}

/// Turns online/offline edges into role and alert post changes for every
/// member linked to the broadcaster.
///
/// Transitions for one broadcaster are serialized in arrival order;
/// different broadcasters run concurrently.
pub struct LiveStateDispatcher {
    registry: Arc<dyn StreamRegistry>,
    provider: Arc<dyn SubscriptionProvider>,
    rules: Arc<RoleRuleEngine>,
    locks: KeyedLocks<BroadcasterId>,
}

impl LiveStateDispatcher {
    pub fn new(
        registry: Arc<dyn StreamRegistry>,
        provider: Arc<dyn SubscriptionProvider>,
        rules: Arc<RoleRuleEngine>,
    ) -> Self {
        Self {
            registry,
            provider,
            rules,
            locks: KeyedLocks::new(),
        }
    }

    pub fn rules(&self) -> &Arc<RoleRuleEngine> {
        &self.rules
    }

    pub async fn handle_notification(&self, notification: StreamNotification) -> Result<LiveTransition, Error> {
        match notification {
            StreamNotification::Online { broadcaster_id, started_at } => {
                self.on_online(&broadcaster_id, Some(started_at)).await
            }
            StreamNotification::Offline { broadcaster_id } => self.on_offline(&broadcaster_id).await,
        }
    }

    pub async fn on_online(
        &self,
        broadcaster_id: &BroadcasterId,
        observed_at: Option<DateTime<Utc>>,
    ) -> Result<LiveTransition, Error> {
        let _guard = self.locks.lock(broadcaster_id).await;

        // Rows exist only for linked broadcasters; a push from a leftover
        // subscription must not bring one back.
        let Some(stream) = self.registry.get_stream(broadcaster_id).await? else {
            debug!("{} is not linked anywhere; ignoring online", broadcaster_id);
            return Ok(LiveTransition::Unchanged);
        };
        if stream.is_live {
            debug!("{} already live", broadcaster_id);
            return Ok(LiveTransition::Unchanged);
        }

        let since = observed_at.unwrap_or_else(Utc::now);
        self.registry.set_stream_live(broadcaster_id, true, Some(since)).await?;
        info!("{} went live", broadcaster_id);

        let links = self.registry.list_links_for_broadcaster(broadcaster_id, None).await?;
        let mut report = BatchReport::new("on_online");
        for link in links {
            let res = self
                .rules
                .apply_live_effects(&link.guild_id, &link.user_id, broadcaster_id)
                .await;
            if let Err(e) = &res {
                warn!("live effects for {} in {} failed: {}", link.user_id, link.guild_id, e);
            }
            report.record(format!("{}/{}", link.guild_id, link.user_id), &res);
        }

        report.into_result().map(|_| LiveTransition::WentLive)
    }

    pub async fn on_offline(&self, broadcaster_id: &BroadcasterId) -> Result<LiveTransition, Error> {
        let _guard = self.locks.lock(broadcaster_id).await;

        let is_live = self
            .registry
            .get_stream(broadcaster_id)
            .await?
            .map(|s| s.is_live)
            .unwrap_or(false);
        if !is_live {
            debug!("{} already offline", broadcaster_id);
            return Ok(LiveTransition::Unchanged);
        }

        self.registry.set_stream_live(broadcaster_id, false, None).await?;
        info!("{} went offline", broadcaster_id);

        let links = self.registry.list_links_for_broadcaster(broadcaster_id, None).await?;
        let mut report = BatchReport::new("on_offline");
        for link in links {
            let res = self
                .rules
                .revert_live_effects(&link.guild_id, &link.user_id, broadcaster_id)
                .await;
            if let Err(e) = &res {
                warn!("reverting live effects for {} in {} failed: {}", link.user_id, link.guild_id, e);
            }
            report.record(format!("{}/{}", link.guild_id, link.user_id), &res);
        }

        let cleared = self.rules.clear_alert_posts(broadcaster_id).await;
        if let Err(e) = &cleared {
            warn!("clearing alert posts for {} failed: {}", broadcaster_id, e);
        }
        report.record("alert_posts", &cleared);

        report.into_result().map(|_| LiveTransition::WentOffline)
    }

    /// Asks the provider directly. Anything but `Live` counts as offline.
    pub async fn force_poll(&self, broadcaster_id: &BroadcasterId) -> Result<LiveTransition, Error> {
        match self.provider.live_status(broadcaster_id).await? {
            LiveStatus::Live { started_at } => self.on_online(broadcaster_id, started_at).await,
            LiveStatus::Offline => self.on_offline(broadcaster_id).await,
            LiveStatus::Unknown => {
                debug!("live status of {} unknown; treating as offline", broadcaster_id);
                self.on_offline(broadcaster_id).await
            }
        }
    }

    /// Applies live effects to one freshly linked member, under the
    /// broadcaster's lock so it cannot interleave with an offline edge.
    pub async fn apply_for_new_link(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<(), Error> {
        let _guard = self.locks.lock(broadcaster_id).await;

        let still_live = self
            .registry
            .get_stream(broadcaster_id)
            .await?
            .map(|s| s.is_live)
            .unwrap_or(false);
        if !still_live {
            debug!("{} went offline before {} could be updated", broadcaster_id, member_id);
            return Ok(());
        }
        self.rules.apply_live_effects(guild_id, member_id, broadcaster_id).await
    }

    /// Reverts live effects of a member that no longer links a live stream.
    pub async fn revert_for_member(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<(), Error> {
        let _guard = self.locks.lock(broadcaster_id).await;
        self.rules.revert_live_effects(guild_id, member_id, broadcaster_id).await
    }

    pub fn prune_locks(&self) {
        self.locks.prune();
    }
}
