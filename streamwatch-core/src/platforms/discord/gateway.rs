use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use twilight_gateway::{self as gateway, Config, Event, EventTypeFlags, Intents, Shard, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::EmojiReactionType;
use twilight_model::gateway::GatewayReaction;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use streamwatch_common::models::role_rule::ReactionEvent;

use crate::Error;
use crate::services::roles::RoleRuleEngine;

/// Stored emoji form for a gateway emoji, matching what reaction rules keep.
pub fn emoji_key(emoji: &EmojiReactionType) -> String {
    match emoji {
        EmojiReactionType::Custom { id, name, .. } => {
            format!("{}:{}", name.as_deref().unwrap_or_default(), id)
        }
        EmojiReactionType::Unicode { name } => name.clone(),
    }
}

fn reaction_event(reaction: &GatewayReaction) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        guild_id: reaction.guild_id?.to_string(),
        channel_id: reaction.channel_id.to_string(),
        message_id: reaction.message_id.to_string(),
        emoji: emoji_key(&reaction.emoji),
        user_id: reaction.user_id.to_string(),
    })
}

/// Routes reactions to the rule engine and re-arms initial reactions when a
/// guild becomes available.
async fn shard_runner(mut shard: Shard, engine: Arc<RoleRuleEngine>) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for reactions.");

    let wanted = EventTypeFlags::READY
        | EventTypeFlags::GUILD_CREATE
        | EventTypeFlags::REACTION_ADD
        | EventTypeFlags::REACTION_REMOVE;
    let mut bot_user: Option<Id<UserMarker>> = None;

    while let Some(item) = shard.next_event(wanted).await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                warn!("Shard {shard_id} => error receiving event: {e:?}");
                continue;
            }
        };

        match event {
            Event::Ready(ready) => {
                info!("Shard {shard_id} => READY as {} (ID={})", ready.user.name, ready.user.id);
                bot_user = Some(ready.user.id);
            }
            Event::GuildCreate(guild) => {
                let guild_id = guild.id().to_string();
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.init_reactions(&guild_id).await {
                        warn!("re-arming reactions in {} failed: {}", guild_id, e);
                    }
                });
            }
            Event::ReactionAdd(reaction) => {
                if Some(reaction.user_id) == bot_user {
                    continue;
                }
                let Some(evt) = reaction_event(&reaction.0) else {
                    debug!("ignoring reaction outside a guild");
                    continue;
                };
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.apply_reaction_rule(&evt).await {
                        warn!("reaction add for {} on {} failed: {}", evt.user_id, evt.message_id, e);
                    }
                });
            }
            Event::ReactionRemove(reaction) => {
                if Some(reaction.user_id) == bot_user {
                    continue;
                }
                let Some(evt) = reaction_event(&reaction.0) else {
                    continue;
                };
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.undo_reaction_rule(&evt).await {
                        warn!("reaction remove for {} on {} failed: {}", evt.user_id, evt.message_id, e);
                    }
                });
            }
            _ => {}
        }
    }

    info!("(ShardRunner) Shard {shard_id} stopped.");
}

/// Connects the recommended number of shards and spawns a runner for each.
pub async fn spawn_reaction_listener(
    token: &str,
    http: Arc<HttpClient>,
    engine: Arc<RoleRuleEngine>,
) -> Result<Vec<JoinHandle<()>>, Error> {
    let config = Config::new(
        token.to_string(),
        Intents::GUILDS | Intents::GUILD_MESSAGE_REACTIONS,
    );

    let shards = gateway::create_recommended(&http, config, |_, b| b.build())
        .await
        .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

    let mut handles = Vec::new();
    for shard in shards {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            shard_runner(shard, engine).await;
        }));
    }
    if handles.is_empty() {
        error!("Discord recommended zero shards");
    }
    Ok(handles)
}
