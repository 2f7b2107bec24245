// File: streamwatch-core/src/services/roles/rule_engine.rs

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use streamwatch_common::models::batch::BatchReport;
use streamwatch_common::models::purge::{FailedMemberRemoval, FailedRuleUndo, PurgeReport};
use streamwatch_common::models::role_rule::{
    ManagedRoleRule, ReactionEvent, ReactionRoleParams, RoleAssignment,
};
use streamwatch_common::models::stream::{AlertPost, BroadcasterId};
use streamwatch_common::traits::guild_traits::GuildGateway;
use streamwatch_common::traits::repository_traits::{RoleRuleRepository, StreamRegistry};

use crate::Error;
use crate::services::roles::member_pages::MemberPages;

pub const DEFAULT_PURGE_CONCURRENCY: usize = 8;

/// Applies managed role rules: live-stream roles and alert posts, reaction
/// roles, and whole-guild purges of a managed role.
pub struct RoleRuleEngine {
    registry: Arc<dyn StreamRegistry>,
    rules: Arc<dyn RoleRuleRepository>,
    guild: Arc<dyn GuildGateway>,
    purge_concurrency: usize,
}

fn alert_text(member_id: &str) -> String {
    format!("<@{}> is now live on Twitch!", member_id)
}

/// Keeps the first error while letting the loop carry on.
fn keep_first(slot: &mut Option<Error>, res: Result<(), Error>) {
    if let Err(e) = res {
        slot.get_or_insert(e);
    }
}

impl RoleRuleEngine {
    pub fn new(
        registry: Arc<dyn StreamRegistry>,
        rules: Arc<dyn RoleRuleRepository>,
        guild: Arc<dyn GuildGateway>,
    ) -> Self {
        Self {
            registry,
            rules,
            guild,
            purge_concurrency: DEFAULT_PURGE_CONCURRENCY,
        }
    }

    pub fn with_purge_concurrency(mut self, n: usize) -> Self {
        self.purge_concurrency = n.max(1);
        self
    }

    /// Live-stream rules of the guild; malformed ones are skipped.
    async fn live_stream_roles(&self, guild_id: &str) -> Result<Vec<String>, Error> {
        let rules = self.rules.list_live_stream_rules(guild_id).await?;
        let mut roles = Vec::with_capacity(rules.len());
        for rule in rules {
            match rule.assignment() {
                Ok(RoleAssignment::LiveStream) => roles.push(rule.role_id),
                Ok(other) => {
                    warn!("rule {} listed as live_stream but is {}", rule.rule_id, other.kind());
                }
                Err(e) => warn!("skipping rule: {}", e),
            }
        }
        Ok(roles)
    }

    /// Grants the guild's live roles to the member and makes sure the guild
    /// has an alert post for the stream.
    pub async fn apply_live_effects(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<(), Error> {
        let mut first_err = None;

        for role_id in self.live_stream_roles(guild_id).await? {
            let res = self.guild.add_member_role(guild_id, member_id, &role_id).await;
            match &res {
                Ok(()) => debug!("granted live role {} to {} in {}", role_id, member_id, guild_id),
                Err(e) => warn!("could not grant live role {} to {} in {}: {}", role_id, member_id, guild_id, e),
            }
            keep_first(&mut first_err, res);
        }

        keep_first(&mut first_err, self.ensure_alert_post(guild_id, member_id, broadcaster_id).await);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ensure_alert_post(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<(), Error> {
        let config = self.registry.get_or_create_guild(guild_id).await?;
        let Some(channel_id) = config.stream_notification_channel else {
            return Ok(());
        };

        let already_posted = self
            .registry
            .get_stream(broadcaster_id)
            .await?
            .map(|s| s.post_for_guild(guild_id).is_some())
            .unwrap_or(false);
        if already_posted {
            debug!("guild {} already has an alert post for {}", guild_id, broadcaster_id);
            return Ok(());
        }

        let message_id = self.guild.create_message(&channel_id, &alert_text(member_id)).await?;
        let ours = AlertPost {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.clone(),
            message_id,
        };

        let stored = match self.registry.add_alert_post(broadcaster_id, &ours).await {
            Ok(p) => p,
            Err(e) => {
                self.delete_post_message(&ours).await;
                return Err(e);
            }
        };

        if stored != ours {
            debug!("lost alert post race for {} in {}; removing duplicate", broadcaster_id, guild_id);
            self.delete_post_message(&ours).await;
        } else {
            info!("posted live alert for {} in guild {}", broadcaster_id, guild_id);
        }
        Ok(())
    }

    async fn delete_post_message(&self, post: &AlertPost) -> bool {
        match self.guild.delete_message(&post.channel_id, &post.message_id).await {
            Ok(()) | Err(Error::NotFound(_)) => true,
            Err(e) => {
                warn!(
                    "could not delete alert post {} in channel {}: {}",
                    post.message_id, post.channel_id, e
                );
                false
            }
        }
    }

    /// A member who already left no longer holds the role.
    async fn revoke_role(&self, guild_id: &str, member_id: &str, role_id: &str) -> Result<(), Error> {
        match self.guild.remove_member_role(guild_id, member_id, role_id).await {
            Err(Error::NotFound(_)) => {
                debug!("{} is no longer in {}; nothing to revoke", member_id, guild_id);
                Ok(())
            }
            other => other,
        }
    }

    /// Takes the guild's live roles away from the member. Alert posts are
    /// cleared separately.
    pub async fn revert_live_effects(
        &self,
        guild_id: &str,
        member_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<(), Error> {
        let mut first_err = None;
        for role_id in self.live_stream_roles(guild_id).await? {
            let res = self.revoke_role(guild_id, member_id, &role_id).await;
            match &res {
                Ok(()) => debug!("revoked live role {} from {} ({})", role_id, member_id, broadcaster_id),
                Err(e) => warn!("could not revoke live role {} from {} in {}: {}", role_id, member_id, guild_id, e),
            }
            keep_first(&mut first_err, res);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deletes every alert post message for the broadcaster and clears them
    /// from the registry.
    pub async fn clear_alert_posts(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        let posts = match self.registry.get_stream(broadcaster_id).await? {
            Some(stream) => stream.alert_posts,
            None => return Ok(()),
        };

        let mut report = BatchReport::new("clear_alert_posts");
        for post in &posts {
            if self.delete_post_message(post).await {
                report.record_ok(&post.message_id);
            } else {
                report.record_failure(
                    &post.message_id,
                    &Error::Platform(format!("alert post in channel {} not deleted", post.channel_id)),
                );
            }
        }

        self.registry.clear_alert_posts(broadcaster_id).await?;
        report.into_result().map(|_| ())
    }

    /// Removes this guild's alert posts for the broadcaster.
    pub async fn remove_guild_alert_posts(&self, guild_id: &str, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        let posts = self.registry.remove_alert_posts_for_guild(broadcaster_id, guild_id).await?;
        for post in &posts {
            self.delete_post_message(post).await;
        }
        Ok(())
    }

    async fn reaction_rules(&self, event: &ReactionEvent) -> Result<Vec<(ManagedRoleRule, ReactionRoleParams)>, Error> {
        let rules = self
            .rules
            .find_reaction_rules(&event.guild_id, &event.message_id, &event.emoji)
            .await?;
        Ok(rules
            .into_iter()
            .filter_map(|rule| match rule.assignment() {
                Ok(RoleAssignment::Reaction(params)) => Some((rule, params)),
                Ok(_) => None,
                Err(e) => {
                    warn!("skipping rule: {}", e);
                    None
                }
            })
            .collect())
    }

    /// A member reacted: grant the role of every matching reaction rule.
    pub async fn apply_reaction_rule(&self, event: &ReactionEvent) -> Result<(), Error> {
        let mut first_err = None;
        for (rule, params) in self.reaction_rules(event).await? {
            let granted = self
                .guild
                .add_member_role(&event.guild_id, &event.user_id, &rule.role_id)
                .await;
            if let Err(e) = granted {
                warn!("reaction rule {}: could not grant {} to {}: {}", rule.rule_id, rule.role_id, event.user_id, e);
                first_err.get_or_insert(e);
                continue;
            }
            info!("reaction rule {}: granted {} to {}", rule.rule_id, rule.role_id, event.user_id);

            if params.clear_after {
                let res = self
                    .guild
                    .remove_member_reaction(&event.channel_id, &event.message_id, &event.emoji, &event.user_id)
                    .await;
                if let Err(e) = &res {
                    warn!("reaction rule {}: could not clear reaction of {}: {}", rule.rule_id, event.user_id, e);
                }
                keep_first(&mut first_err, res);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// A member removed a reaction: revoke the role unless the rule keeps it.
    pub async fn undo_reaction_rule(&self, event: &ReactionEvent) -> Result<(), Error> {
        let mut first_err = None;
        for (rule, params) in self.reaction_rules(event).await? {
            // With clear_after the removal is our own clean-up.
            if params.no_remove || params.clear_after {
                debug!("reaction rule {}: keeping {} for {}", rule.rule_id, rule.role_id, event.user_id);
                continue;
            }
            let res = self
                .guild
                .remove_member_role(&event.guild_id, &event.user_id, &rule.role_id)
                .await;
            match &res {
                Ok(()) => info!("reaction rule {}: revoked {} from {}", rule.rule_id, rule.role_id, event.user_id),
                Err(e) => warn!("reaction rule {}: could not revoke {} from {}: {}", rule.rule_id, rule.role_id, event.user_id, e),
            }
            keep_first(&mut first_err, res);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Puts the bot's own reaction back on every `initial_react` post.
    pub async fn init_reactions(&self, guild_id: &str) -> Result<BatchReport, Error> {
        let rules = self.rules.list_initial_react_rules(guild_id).await?;
        let mut report = BatchReport::new("init_reactions");
        for rule in rules {
            let res = match rule.assignment() {
                Ok(RoleAssignment::Reaction(p)) => self.guild.add_reaction(&p.channel_id, &p.message_id, &p.emoji).await,
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            if let Err(e) = &res {
                warn!("init_reactions: rule {} failed: {}", rule.rule_id, e);
            }
            report.record(rule.rule_id, &res);
        }
        debug!("init_reactions: {} rules re-armed in {}", report.succeeded(), guild_id);
        report.into_result()
    }

    pub async fn add_reaction_rule(
        &self,
        guild_id: &str,
        role_id: &str,
        params: ReactionRoleParams,
    ) -> Result<ManagedRoleRule, Error> {
        let rule = ManagedRoleRule::reaction(guild_id, role_id, params.clone())?;
        self.rules.insert_rule(&rule).await?;
        info!("added reaction rule {} for role {} in {}", rule.rule_id, role_id, guild_id);

        if params.initial_react {
            if let Err(e) = self.guild.add_reaction(&params.channel_id, &params.message_id, &params.emoji).await {
                warn!("rule {}: could not add initial reaction: {}", rule.rule_id, e);
            }
        }
        Ok(rule)
    }

    pub async fn add_live_stream_rule(&self, guild_id: &str, role_id: &str) -> Result<ManagedRoleRule, Error> {
        let rule = ManagedRoleRule::live_stream(guild_id, role_id);
        self.rules.insert_rule(&rule).await?;
        info!("added live stream rule {} for role {} in {}", rule.rule_id, role_id, guild_id);
        Ok(rule)
    }

    /// Removes a managed role from every member of the guild and undoes all
    /// of its rules. Per-member and per-rule failures are reported, not raised.
    pub async fn purge_role(&self, guild_id: &str, role_id: &str) -> Result<PurgeReport, Error> {
        if !self.rules.is_managed_role(guild_id, role_id).await? {
            return Err(Error::NotFound(format!("role {} is not managed in guild {}", role_id, guild_id)));
        }

        let holders = MemberPages::new(self.guild.clone(), guild_id)
            .collect_role_holders(role_id)
            .await?;
        info!("purge: removing role {} from {} members of {}", role_id, holders.len(), guild_id);

        let mut report = PurgeReport {
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
            holders: holders.len(),
            ..Default::default()
        };

        let results: Vec<_> = stream::iter(holders)
            .map(|member| async move {
                let res = self.revoke_role(guild_id, &member.user_id, role_id).await;
                (member, res)
            })
            .buffer_unordered(self.purge_concurrency)
            .collect()
            .await;

        for (member, res) in results {
            if let Err(e) = res {
                warn!("purge: could not remove {} from {} ({}): {}", role_id, member.display_name, member.user_id, e);
                report.failed_members.push(FailedMemberRemoval {
                    user_id: member.user_id,
                    display_name: member.display_name,
                    cause: e.to_string(),
                });
            }
        }

        match self.rules.list_rules_for_role(guild_id, role_id).await {
            Ok(rules) => {
                for rule in rules {
                    match self.undo_rule(&rule).await {
                        Ok(()) => report.rules_undone += 1,
                        Err(e) => {
                            warn!("purge: rule {} not undone: {}", rule.rule_id, e);
                            report.failed_rules.push(FailedRuleUndo {
                                rule_id: Some(rule.rule_id),
                                cause: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                warn!("purge: could not list rules for {}: {}", role_id, e);
                report.failed_rules.push(FailedRuleUndo {
                    rule_id: None,
                    cause: e.to_string(),
                });
            }
        }

        if report.is_success() {
            info!("purge: role {} cleared from guild {}", role_id, guild_id);
        } else {
            warn!(
                "purge: role {} in {} finished with {} member and {} rule failures",
                role_id,
                guild_id,
                report.failed_members.len(),
                report.failed_rules.len()
            );
        }
        Ok(report)
    }

    /// Undoes one rule. The undo is all-or-nothing from the caller's view;
    /// steps that already ran are logged.
    async fn undo_rule(&self, rule: &ManagedRoleRule) -> Result<(), Error> {
        match rule.assignment()? {
            RoleAssignment::Reaction(params) => {
                self.guild
                    .remove_all_reactions_for_emoji(&params.channel_id, &params.message_id, &params.emoji)
                    .await?;
                if let Err(e) = self.rules.delete_rule(rule.rule_id).await {
                    error!(
                        "rule {}: reactions on message {} were cleared but the rule was not deleted",
                        rule.rule_id, params.message_id
                    );
                    return Err(e);
                }
                Ok(())
            }
            RoleAssignment::LiveStream => self.rules.delete_rule(rule.rule_id).await,
        }
    }
}
