use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Error;
use crate::models::guild::GuildConfig;
use crate::models::member::{LinkSwap, MemberLink};
use crate::models::role_rule::ManagedRoleRule;
use crate::models::stream::{AlertPost, BroadcasterId, StreamState};

/// Durable store of guild configuration, member links and per-broadcaster
/// stream state.
#[async_trait]
pub trait StreamRegistry: Send + Sync {
    // ---- guilds ----
    async fn get_or_create_guild(&self, guild_id: &str) -> Result<GuildConfig, Error>;

    /// Returns `true` if the role was added, `false` if it already was an admin role.
    async fn add_admin_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error>;

    async fn set_stream_notification_channel(&self, guild_id: &str, channel_id: Option<&str>) -> Result<(), Error>;

    // ---- member links ----

    /// Atomically replaces the member's link, returning the previous
    /// broadcaster and the (get-or-created) stream state of the new one.
    async fn swap_member_link(
        &self,
        guild_id: &str,
        user_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<LinkSwap, Error>;

    /// Deletes the member's link, returning the broadcaster it pointed at.
    async fn remove_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<BroadcasterId>, Error>;

    async fn get_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<MemberLink>, Error>;

    /// Every distinct broadcaster referenced by at least one member link.
    async fn list_linked_broadcasters(&self) -> Result<Vec<BroadcasterId>, Error>;

    /// Links referencing `broadcaster_id`, optionally only within one guild.
    async fn list_links_for_broadcaster(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: Option<&str>,
    ) -> Result<Vec<MemberLink>, Error>;

    // ---- stream state ----

    /// Insert-or-return-existing.
    async fn get_or_create_stream(&self, broadcaster_id: &BroadcasterId) -> Result<StreamState, Error>;

    async fn get_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamState>, Error>;

    async fn set_stream_live(
        &self,
        broadcaster_id: &BroadcasterId,
        is_live: bool,
        live_since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), Error>;

    /// Records an alert post unless the guild already has one for this
    /// broadcaster. Returns whichever post is stored afterwards, so a caller
    /// that lost a race sees the winner's post.
    async fn add_alert_post(&self, broadcaster_id: &BroadcasterId, post: &AlertPost) -> Result<AlertPost, Error>;

    /// Removes and returns this guild's alert posts for the broadcaster.
    async fn remove_alert_posts_for_guild(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: &str,
    ) -> Result<Vec<AlertPost>, Error>;

    /// Removes and returns every alert post for the broadcaster.
    async fn clear_alert_posts(&self, broadcaster_id: &BroadcasterId) -> Result<Vec<AlertPost>, Error>;

    async fn delete_stream(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error>;
}

#[async_trait]
pub trait RoleRuleRepository: Send + Sync {
    async fn insert_rule(&self, rule: &ManagedRoleRule) -> Result<(), Error>;
    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<ManagedRoleRule>, Error>;
    async fn list_rules_for_role(&self, guild_id: &str, role_id: &str) -> Result<Vec<ManagedRoleRule>, Error>;
    async fn list_rules_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error>;

    /// Reaction rules watching this (message, emoji).
    async fn find_reaction_rules(
        &self,
        guild_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ManagedRoleRule>, Error>;

    async fn list_live_stream_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error>;

    /// Reaction rules for which the bot should place its own reaction.
    async fn list_initial_react_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error>;

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), Error>;

    async fn is_managed_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        Ok(!self.list_rules_for_role(guild_id, role_id).await?.is_empty())
    }
}
