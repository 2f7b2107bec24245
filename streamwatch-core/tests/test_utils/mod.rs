// File: streamwatch-core/tests/test_utils/mod.rs
//
// In-memory stand-ins for the provider, the registry, the rule store and the
// guild platform, with knobs for injecting failures.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use streamwatch_common::models::guild::{GuildConfig, GuildMember};
use streamwatch_common::models::member::{LinkSwap, MemberLink};
use streamwatch_common::models::provider::{BroadcasterProfile, LiveStatus};
use streamwatch_common::models::role_rule::ManagedRoleRule;
use streamwatch_common::models::stream::{AlertPost, BroadcasterId, StreamState};
use streamwatch_common::models::subscription::{
    ProviderSubscription, SubscriptionDirection, SubscriptionStatus,
};
use streamwatch_common::traits::guild_traits::GuildGateway;
use streamwatch_common::traits::provider_traits::SubscriptionProvider;
use streamwatch_common::traits::repository_traits::{RoleRuleRepository, StreamRegistry};
use streamwatch_core::Error;
use streamwatch_core::services::{LiveStateDispatcher, RoleRuleEngine, SubscriptionReconciler};

pub fn bid(id: &str) -> BroadcasterId {
    BroadcasterId::new(id)
}

// ---------------------------------------------------------------------------
// provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProvider {
    pub subs: Mutex<BTreeMap<String, ProviderSubscription>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Creating this direction fails with `Unavailable`.
    pub fail_create_direction: Mutex<Option<SubscriptionDirection>>,
    /// Any create for these broadcasters fails with `Unavailable`.
    pub fail_create_for: Mutex<HashSet<BroadcasterId>>,
    pub fail_deletes: Mutex<bool>,
    pub fail_listing: Mutex<bool>,
    pub live: Mutex<HashMap<BroadcasterId, LiveStatus>>,
    pub profiles: Mutex<HashMap<String, BroadcasterProfile>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_profile(&self, login: &str, id: &str) {
        self.profiles.lock().insert(
            login.to_string(),
            BroadcasterProfile {
                id: bid(id),
                login: login.to_string(),
                display_name: login.to_uppercase(),
            },
        );
    }

    pub fn set_live(&self, id: &str, status: LiveStatus) {
        self.live.lock().insert(bid(id), status);
    }

    /// Seeds a subscription as if it had been created in an earlier run.
    pub fn seed(&self, sub_id: &str, direction: SubscriptionDirection, broadcaster: &str, status: &str) {
        self.subs.lock().insert(
            sub_id.to_string(),
            ProviderSubscription {
                id: sub_id.to_string(),
                direction,
                broadcaster_id: bid(broadcaster),
                status: SubscriptionStatus::from_provider(status),
                created_at: None,
            },
        );
    }

    pub fn subs_for(&self, broadcaster: &str) -> Vec<ProviderSubscription> {
        self.subs
            .lock()
            .values()
            .filter(|s| s.broadcaster_id.as_str() == broadcaster)
            .cloned()
            .collect()
    }

    pub fn total(&self) -> usize {
        self.subs.lock().len()
    }
}

#[async_trait]
impl SubscriptionProvider for FakeProvider {
    async fn create_subscription(
        &self,
        direction: SubscriptionDirection,
        broadcaster_id: &BroadcasterId,
    ) -> Result<ProviderSubscription, Error> {
        if *self.fail_create_direction.lock() == Some(direction)
            || self.fail_create_for.lock().contains(broadcaster_id)
        {
            return Err(Error::Unavailable(format!("create {} for {}", direction, broadcaster_id)));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sub = ProviderSubscription {
            id: format!("sub-{}", n),
            direction,
            broadcaster_id: broadcaster_id.clone(),
            status: SubscriptionStatus::VerificationPending,
            created_at: Some(Utc::now()),
        };
        self.subs.lock().insert(sub.id.clone(), sub.clone());
        Ok(sub)
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error> {
        if *self.fail_deletes.lock() {
            return Err(Error::Unavailable(format!("delete {}", subscription_id)));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.subs.lock().remove(subscription_id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(subscription_id.to_string())),
        }
    }

    async fn list_subscriptions(&self) -> Result<Vec<ProviderSubscription>, Error> {
        if *self.fail_listing.lock() {
            return Err(Error::Unavailable("list".into()));
        }
        Ok(self.subs.lock().values().cloned().collect())
    }

    async fn live_status(&self, broadcaster_id: &BroadcasterId) -> Result<LiveStatus, Error> {
        Ok(self
            .live
            .lock()
            .get(broadcaster_id)
            .cloned()
            .unwrap_or(LiveStatus::Offline))
    }

    async fn resolve_broadcaster(&self, name_or_url: &str) -> Result<Option<BroadcasterProfile>, Error> {
        let login = name_or_url.rsplit('/').next().unwrap_or(name_or_url).to_lowercase();
        Ok(self.profiles.lock().get(&login).cloned())
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    guilds: HashMap<String, GuildConfig>,
    links: BTreeMap<(String, String), MemberLink>,
    streams: HashMap<BroadcasterId, StreamState>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stream(&self, id: &str) -> Option<StreamState> {
        self.state.lock().streams.get(&bid(id)).cloned()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }
}

#[async_trait]
impl StreamRegistry for InMemoryRegistry {
    async fn get_or_create_guild(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let mut st = self.state.lock();
        Ok(st
            .guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| GuildConfig::default_for(guild_id))
            .clone())
    }

    async fn add_admin_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        let mut st = self.state.lock();
        let guild = st
            .guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| GuildConfig::default_for(guild_id));
        if guild.admin_roles.iter().any(|r| r == role_id) {
            return Ok(false);
        }
        guild.admin_roles.push(role_id.to_string());
        Ok(true)
    }

    async fn set_stream_notification_channel(&self, guild_id: &str, channel_id: Option<&str>) -> Result<(), Error> {
        let mut st = self.state.lock();
        let guild = st
            .guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| GuildConfig::default_for(guild_id));
        guild.stream_notification_channel = channel_id.map(str::to_string);
        Ok(())
    }

    async fn swap_member_link(
        &self,
        guild_id: &str,
        user_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<LinkSwap, Error> {
        let mut st = self.state.lock();
        let previous = st
            .links
            .insert(
                (guild_id.to_string(), user_id.to_string()),
                MemberLink {
                    guild_id: guild_id.to_string(),
                    user_id: user_id.to_string(),
                    broadcaster_id: broadcaster_id.clone(),
                    linked_at: Utc::now(),
                },
            )
            .map(|l| l.broadcaster_id);
        let stream = st
            .streams
            .entry(broadcaster_id.clone())
            .or_insert_with(|| StreamState::offline(broadcaster_id.clone()))
            .clone();
        Ok(LinkSwap { previous, stream })
    }

    async fn remove_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<BroadcasterId>, Error> {
        Ok(self
            .state
            .lock()
            .links
            .remove(&(guild_id.to_string(), user_id.to_string()))
            .map(|l| l.broadcaster_id))
    }

    async fn get_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<MemberLink>, Error> {
        Ok(self
            .state
            .lock()
            .links
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn list_linked_broadcasters(&self) -> Result<Vec<BroadcasterId>, Error> {
        let ids: BTreeSet<BroadcasterId> = self
            .state
            .lock()
            .links
            .values()
            .map(|l| l.broadcaster_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn list_links_for_broadcaster(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: Option<&str>,
    ) -> Result<Vec<MemberLink>, Error> {
        Ok(self
            .state
            .lock()
            .links
            .values()
            .filter(|l| &l.broadcaster_id == broadcaster_id)
            .filter(|l| guild_id.is_none_or(|g| l.guild_id == g))
            .cloned()
            .collect())
    }

    async fn get_or_create_stream(&self, broadcaster_id: &BroadcasterId) -> Result<StreamState, Error> {
        let mut st = self.state.lock();
        Ok(st
            .streams
            .entry(broadcaster_id.clone())
            .or_insert_with(|| StreamState::offline(broadcaster_id.clone()))
            .clone())
    }

    async fn get_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamState>, Error> {
        Ok(self.state.lock().streams.get(broadcaster_id).cloned())
    }

    async fn set_stream_live(
        &self,
        broadcaster_id: &BroadcasterId,
        is_live: bool,
        live_since: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let mut st = self.state.lock();
        let stream = st
            .streams
            .get_mut(broadcaster_id)
            .ok_or_else(|| Error::NotFound(broadcaster_id.to_string()))?;
        stream.is_live = is_live;
        stream.live_since = if is_live { live_since } else { None };
        Ok(())
    }

    async fn add_alert_post(&self, broadcaster_id: &BroadcasterId, post: &AlertPost) -> Result<AlertPost, Error> {
        let mut st = self.state.lock();
        let stream = st
            .streams
            .get_mut(broadcaster_id)
            .ok_or_else(|| Error::NotFound(broadcaster_id.to_string()))?;
        if let Some(existing) = stream.post_for_guild(&post.guild_id) {
            return Ok(existing.clone());
        }
        stream.alert_posts.insert(post.clone());
        Ok(post.clone())
    }

    async fn remove_alert_posts_for_guild(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: &str,
    ) -> Result<Vec<AlertPost>, Error> {
        let mut st = self.state.lock();
        let Some(stream) = st.streams.get_mut(broadcaster_id) else {
            return Ok(Vec::new());
        };
        let removed: Vec<AlertPost> = stream
            .alert_posts
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .cloned()
            .collect();
        stream.alert_posts.retain(|p| p.guild_id != guild_id);
        Ok(removed)
    }

    async fn clear_alert_posts(&self, broadcaster_id: &BroadcasterId) -> Result<Vec<AlertPost>, Error> {
        let mut st = self.state.lock();
        Ok(st
            .streams
            .get_mut(broadcaster_id)
            .map(|s| s.alert_posts.drain().collect())
            .unwrap_or_default())
    }

    async fn delete_stream(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        self.state.lock().streams.remove(broadcaster_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// rules
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRuleRepo {
    pub rules: Mutex<Vec<ManagedRoleRule>>,
    pub fail_deletes: Mutex<bool>,
}

impl InMemoryRuleRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.rules.lock().iter().map(|r| r.rule_id).collect()
    }
}

fn param_str<'a>(rule: &'a ManagedRoleRule, key: &str) -> Option<&'a str> {
    rule.params.get(key).and_then(|v| v.as_str())
}

#[async_trait]
impl RoleRuleRepository for InMemoryRuleRepo {
    async fn insert_rule(&self, rule: &ManagedRoleRule) -> Result<(), Error> {
        self.rules.lock().push(rule.clone());
        Ok(())
    }

    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<ManagedRoleRule>, Error> {
        Ok(self.rules.lock().iter().find(|r| r.rule_id == rule_id).cloned())
    }

    async fn list_rules_for_role(&self, guild_id: &str, role_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.guild_id == guild_id && r.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn list_rules_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        Ok(self.rules.lock().iter().filter(|r| r.guild_id == guild_id).cloned().collect())
    }

    async fn find_reaction_rules(
        &self,
        guild_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ManagedRoleRule>, Error> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.guild_id == guild_id && r.kind == "reaction")
            .filter(|r| param_str(r, "message_id") == Some(message_id) && param_str(r, "emoji") == Some(emoji))
            .cloned()
            .collect())
    }

    async fn list_live_stream_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.guild_id == guild_id && r.kind == "live_stream")
            .cloned()
            .collect())
    }

    async fn list_initial_react_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.guild_id == guild_id && r.kind == "reaction")
            .filter(|r| r.params.get("initial_react").and_then(|v| v.as_bool()).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), Error> {
        if *self.fail_deletes.lock() {
            return Err(Error::Unavailable(format!("delete rule {}", rule_id)));
        }
        let mut rules = self.rules.lock();
        let before = rules.len();
        rules.retain(|r| r.rule_id != rule_id);
        if rules.len() == before {
            return Err(Error::NotFound(rule_id.to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// guild platform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GuildState {
    /// guild -> user -> member
    members: HashMap<String, BTreeMap<u64, GuildMember>>,
    messages: BTreeMap<String, (String, String)>,
    next_message: u64,
    reactions_added: Vec<(String, String, String)>,
    member_reactions_removed: Vec<(String, String, String, String)>,
    emoji_cleared: Vec<(String, String, String)>,
}

#[derive(Default)]
pub struct FakeGuildGateway {
    state: Mutex<GuildState>,
    /// Role changes for these users fail with `Unavailable`.
    pub fail_role_ops_for: Mutex<HashSet<String>>,
    /// Still listed, but role removal answers `NotFound` as if they left.
    pub left_after_listing: Mutex<HashSet<String>>,
    pub fail_emoji_clear: Mutex<bool>,
    pub list_calls: AtomicUsize,
}

impl FakeGuildGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_member(&self, guild_id: &str, user_id: &str, roles: &[&str]) {
        let key: u64 = user_id.parse().unwrap_or(0);
        self.state.lock().members.entry(guild_id.to_string()).or_default().insert(
            key,
            GuildMember {
                user_id: user_id.to_string(),
                display_name: format!("member{}", user_id),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    pub fn has_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> bool {
        let key: u64 = user_id.parse().unwrap_or(0);
        self.state
            .lock()
            .members
            .get(guild_id)
            .and_then(|m| m.get(&key))
            .map(|m| m.has_role(role_id))
            .unwrap_or(false)
    }

    /// (channel, content) of every message still present.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().messages.values().cloned().collect()
    }

    pub fn reactions_added(&self) -> Vec<(String, String, String)> {
        self.state.lock().reactions_added.clone()
    }

    pub fn member_reactions_removed(&self) -> usize {
        self.state.lock().member_reactions_removed.len()
    }

    pub fn emoji_cleared(&self) -> Vec<(String, String, String)> {
        self.state.lock().emoji_cleared.clone()
    }

    fn check_user(&self, user_id: &str) -> Result<(), Error> {
        if self.fail_role_ops_for.lock().contains(user_id) {
            return Err(Error::Unavailable(format!("role change for {}", user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl GuildGateway for FakeGuildGateway {
    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error> {
        self.check_user(user_id)?;
        let key: u64 = user_id.parse().map_err(|_| Error::Parse(user_id.to_string()))?;
        let mut st = self.state.lock();
        let member = st
            .members
            .entry(guild_id.to_string())
            .or_default()
            .entry(key)
            .or_insert_with(|| GuildMember {
                user_id: user_id.to_string(),
                display_name: format!("member{}", user_id),
                roles: Vec::new(),
            });
        if !member.has_role(role_id) {
            member.roles.push(role_id.to_string());
        }
        Ok(())
    }

    async fn remove_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error> {
        self.check_user(user_id)?;
        if self.left_after_listing.lock().contains(user_id) {
            return Err(Error::NotFound(format!("member {}", user_id)));
        }
        let key: u64 = user_id.parse().map_err(|_| Error::Parse(user_id.to_string()))?;
        let mut st = self.state.lock();
        let member = st
            .members
            .get_mut(guild_id)
            .and_then(|m| m.get_mut(&key))
            .ok_or_else(|| Error::NotFound(format!("member {}", user_id)))?;
        member.roles.retain(|r| r != role_id);
        Ok(())
    }

    async fn list_members(&self, guild_id: &str, after: Option<&str>, limit: u16) -> Result<Vec<GuildMember>, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let after: u64 = match after {
            Some(a) => a.parse().map_err(|_| Error::Parse(a.to_string()))?,
            None => 0,
        };
        let st = self.state.lock();
        Ok(st
            .members
            .get(guild_id)
            .map(|m| {
                m.range(after + 1..)
                    .take(limit as usize)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error> {
        self.state
            .lock()
            .reactions_added
            .push((channel_id.to_string(), message_id.to_string(), emoji.to_string()));
        Ok(())
    }

    async fn remove_member_reaction(&self, channel_id: &str, message_id: &str, emoji: &str, user_id: &str) -> Result<(), Error> {
        self.state.lock().member_reactions_removed.push((
            channel_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
            user_id.to_string(),
        ));
        Ok(())
    }

    async fn remove_all_reactions_for_emoji(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error> {
        if *self.fail_emoji_clear.lock() {
            return Err(Error::Unavailable("clear emoji".into()));
        }
        self.state
            .lock()
            .emoji_cleared
            .push((channel_id.to_string(), message_id.to_string(), emoji.to_string()));
        Ok(())
    }

    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        let mut st = self.state.lock();
        st.next_message += 1;
        let id = format!("{}", 9000 + st.next_message);
        st.messages.insert(id.clone(), (channel_id.to_string(), content.to_string()));
        Ok(id)
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> Result<(), Error> {
        match self.state.lock().messages.remove(message_id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("message {}", message_id))),
        }
    }
}

// ---------------------------------------------------------------------------
// wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub registry: Arc<InMemoryRegistry>,
    pub rule_repo: Arc<InMemoryRuleRepo>,
    pub guild: Arc<FakeGuildGateway>,
    pub engine: Arc<RoleRuleEngine>,
    pub reconciler: Arc<SubscriptionReconciler>,
    pub dispatcher: Arc<LiveStateDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let provider = FakeProvider::new();
        let registry = InMemoryRegistry::new();
        let rule_repo = InMemoryRuleRepo::new();
        let guild = FakeGuildGateway::new();

        let engine = Arc::new(RoleRuleEngine::new(registry.clone(), rule_repo.clone(), guild.clone()));
        let reconciler = Arc::new(SubscriptionReconciler::new(provider.clone()));
        let dispatcher = Arc::new(LiveStateDispatcher::new(registry.clone(), provider.clone(), engine.clone()));

        Self {
            provider,
            registry,
            rule_repo,
            guild,
            engine,
            reconciler,
            dispatcher,
        }
    }
}
