// File: streamwatch-core/src/platforms/discord/client.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use twilight_http::api_error::ApiError;
use twilight_http::client::ClientBuilder;
use twilight_http::error::ErrorType;
use twilight_http::request::channel::reaction::RequestReactionType;
use twilight_http::Client as HttpClient;
use twilight_model::guild::Member;
use twilight_model::id::marker::EmojiMarker;
use twilight_model::id::Id;

use streamwatch_common::models::guild::GuildMember;
use streamwatch_common::traits::guild_traits::GuildGateway;

use crate::Error;

/// Parses a decimal snowflake into a typed id.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<Id<T>, Error> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::Parse(format!("invalid {} id: {}", what, raw)))
}

/// Stored emoji form: the unicode character, or `name:id` for guild emoji.
pub fn reaction_type(emoji: &str) -> Result<RequestReactionType<'_>, Error> {
    match emoji.rsplit_once(':') {
        Some((name, id)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
            let id: Id<EmojiMarker> = parse_id(id, "emoji")?;
            Ok(RequestReactionType::Custom {
                id,
                name: if name.is_empty() { None } else { Some(name) },
            })
        }
        _ => Ok(RequestReactionType::Unicode { name: emoji }),
    }
}

/// Maps twilight's HTTP errors onto our error kinds.
pub fn map_http_error(ctx: &str, err: twilight_http::Error) -> Error {
    let msg = format!("{}: {}", ctx, err);
    match err.kind() {
        ErrorType::Response { status, error, .. } => {
            let code = status.get();
            match code {
                404 => Error::NotFound(msg),
                429 => Error::Unavailable(msg),
                c if c >= 500 => Error::Unavailable(msg),
                _ => match error {
                    ApiError::Ratelimited(_) => Error::Unavailable(msg),
                    _ => Error::Platform(msg),
                },
            }
        }
        ErrorType::RequestTimedOut | ErrorType::RequestError | ErrorType::ServiceUnavailable { .. } => {
            Error::Unavailable(msg)
        }
        _ => Error::Platform(msg),
    }
}

fn to_guild_member(member: Member) -> GuildMember {
    let display_name = member
        .nick
        .clone()
        .or_else(|| member.user.global_name.clone())
        .unwrap_or_else(|| member.user.name.clone());
    GuildMember {
        user_id: member.user.id.to_string(),
        display_name,
        roles: member.roles.iter().map(|r| r.to_string()).collect(),
    }
}

/// [`GuildGateway`] over the Discord REST API.
pub struct DiscordGuildGateway {
    http: Arc<HttpClient>,
}

impl DiscordGuildGateway {
    pub fn new(token: &str) -> Self {
        let http = ClientBuilder::new()
            .token(token.to_string())
            .timeout(Duration::from_secs(30))
            .build();
        Self { http: Arc::new(http) }
    }

    pub fn http(&self) -> Arc<HttpClient> {
        self.http.clone()
    }
}

#[async_trait]
impl GuildGateway for DiscordGuildGateway {
    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error> {
        self.http
            .add_guild_member_role(parse_id(guild_id, "guild")?, parse_id(user_id, "user")?, parse_id(role_id, "role")?)
            .await
            .map_err(|e| map_http_error("add_guild_member_role", e))?;
        Ok(())
    }

    async fn remove_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error> {
        self.http
            .remove_guild_member_role(parse_id(guild_id, "guild")?, parse_id(user_id, "user")?, parse_id(role_id, "role")?)
            .await
            .map_err(|e| map_http_error("remove_guild_member_role", e))?;
        Ok(())
    }

    async fn list_members(&self, guild_id: &str, after: Option<&str>, limit: u16) -> Result<Vec<GuildMember>, Error> {
        let mut req = self.http.guild_members(parse_id(guild_id, "guild")?).limit(limit.min(1000));
        if let Some(after) = after {
            req = req.after(parse_id(after, "user")?);
        }

        let members = req
            .await
            .map_err(|e| map_http_error("guild_members", e))?
            .models()
            .await
            .map_err(|e| Error::Platform(format!("guild_members body: {}", e)))?;

        debug!("listed {} members of {} after {:?}", members.len(), guild_id, after);
        Ok(members.into_iter().map(to_guild_member).collect())
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error> {
        let emoji = reaction_type(emoji)?;
        self.http
            .create_reaction(parse_id(channel_id, "channel")?, parse_id(message_id, "message")?, &emoji)
            .await
            .map_err(|e| map_http_error("create_reaction", e))?;
        Ok(())
    }

    async fn remove_member_reaction(&self, channel_id: &str, message_id: &str, emoji: &str, user_id: &str) -> Result<(), Error> {
        let emoji = reaction_type(emoji)?;
        self.http
            .delete_reaction(
                parse_id(channel_id, "channel")?,
                parse_id(message_id, "message")?,
                &emoji,
                parse_id(user_id, "user")?,
            )
            .await
            .map_err(|e| map_http_error("delete_reaction", e))?;
        Ok(())
    }

    async fn remove_all_reactions_for_emoji(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error> {
        let emoji = reaction_type(emoji)?;
        self.http
            .delete_all_reaction(parse_id(channel_id, "channel")?, parse_id(message_id, "message")?, &emoji)
            .await
            .map_err(|e| map_http_error("delete_all_reaction", e))?;
        Ok(())
    }

    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        let message = self
            .http
            .create_message(parse_id(channel_id, "channel")?)
            .content(content)
            .await
            .map_err(|e| map_http_error("create_message", e))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("create_message body: {}", e)))?;
        Ok(message.id.to_string())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error> {
        self.http
            .delete_message(parse_id(channel_id, "channel")?, parse_id(message_id, "message")?)
            .await
            .map_err(|e| map_http_error("delete_message", e))?;
        Ok(())
    }
}
