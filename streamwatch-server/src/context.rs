// File: streamwatch-server/src/context.rs

use std::sync::Arc;

use tracing::info;

use streamwatch_common::traits::guild_traits::GuildGateway;
use streamwatch_common::traits::provider_traits::SubscriptionProvider;
use streamwatch_common::traits::repository_traits::{RoleRuleRepository, StreamRegistry};
use streamwatch_core::platforms::discord::DiscordGuildGateway;
use streamwatch_core::platforms::twitch::{TwitchHelixClient, TwitchSubscriptionProvider};
use streamwatch_core::platforms::twitch_eventsub::webhook::WebhookState;
use streamwatch_core::repositories::postgres::{PostgresRoleRuleRepository, PostgresStreamRegistry};
use streamwatch_core::services::{
    GuildService, LinkManager, LiveStateDispatcher, NotificationQueue, RoleRuleEngine, SubscriptionReconciler,
};
use streamwatch_core::{Database, Error};

use crate::config::ServerConfig;

/// Everything the server wires together at startup.
pub struct ServerContext {
    pub config: ServerConfig,
    pub db: Database,
    pub registry: Arc<dyn StreamRegistry>,
    pub discord: Arc<DiscordGuildGateway>,
    pub rules: Arc<RoleRuleEngine>,
    pub reconciler: Arc<SubscriptionReconciler>,
    pub dispatcher: Arc<LiveStateDispatcher>,
    pub link_manager: Arc<LinkManager>,
    pub guild_service: Arc<GuildService>,
    pub webhook: Arc<WebhookState>,
}

impl ServerContext {
    pub async fn new(config: ServerConfig) -> Result<Self, Error> {
        let db = Database::new(&config.database_url).await?;
        db.migrate().await?;

        let registry: Arc<dyn StreamRegistry> = Arc::new(PostgresStreamRegistry::new(db.pool().clone()));
        let rule_repo: Arc<dyn RoleRuleRepository> = Arc::new(PostgresRoleRuleRepository::new(db.pool().clone()));

        let helix = Arc::new(TwitchHelixClient::new(&config.twitch_client_id, &config.twitch_client_secret)?);
        let provider: Arc<dyn SubscriptionProvider> = Arc::new(TwitchSubscriptionProvider::new(
            helix,
            &config.callback_url,
            &config.webhook_secret,
        ));

        let discord = Arc::new(DiscordGuildGateway::new(&config.discord_token));
        let guild: Arc<dyn GuildGateway> = discord.clone();

        let rules = Arc::new(
            RoleRuleEngine::new(registry.clone(), rule_repo, guild)
                .with_purge_concurrency(config.purge_concurrency),
        );
        let reconciler = Arc::new(SubscriptionReconciler::new(provider.clone()));
        let dispatcher = Arc::new(LiveStateDispatcher::new(registry.clone(), provider.clone(), rules.clone()));
        let link_manager = Arc::new(LinkManager::new(
            registry.clone(),
            provider,
            reconciler.clone(),
            dispatcher.clone(),
        ));
        let guild_service = Arc::new(GuildService::new(registry.clone(), config.dev_user_id.clone()));
        let queue = Arc::new(NotificationQueue::new(dispatcher.clone()));
        let webhook = Arc::new(WebhookState::new(&config.webhook_secret, queue));

        info!("Server context ready; EventSub callback is {}", config.callback_url);

        Ok(Self {
            config,
            db,
            registry,
            discord,
            rules,
            reconciler,
            dispatcher,
            link_manager,
            guild_service,
            webhook,
        })
    }
}
