use async_trait::async_trait;

use crate::error::Error;
use crate::models::guild::GuildMember;

/// The chat platform operations the role engine needs. IDs are the
/// platform's string snowflakes.
#[async_trait]
pub trait GuildGateway: Send + Sync {
    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error>;
    async fn remove_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), Error>;

    /// One page of members with user ids strictly greater than `after`.
    /// An empty page means the listing is exhausted.
    async fn list_members(&self, guild_id: &str, after: Option<&str>, limit: u16) -> Result<Vec<GuildMember>, Error>;

    /// The bot's own reaction.
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error>;
    async fn remove_member_reaction(&self, channel_id: &str, message_id: &str, emoji: &str, user_id: &str) -> Result<(), Error>;
    async fn remove_all_reactions_for_emoji(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), Error>;

    /// Returns the new message id.
    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String, Error>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error>;
}
