use chrono::{DateTime, Utc};

/// Per-guild configuration managed by the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildConfig {
    pub guild_id: String,
    pub admin_roles: Vec<String>,
    /// Channel where "now live" alert posts are made. No posts without it.
    pub stream_notification_channel: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuildConfig {
    pub fn default_for(guild_id: &str) -> Self {
        let now = Utc::now();
        Self {
            guild_id: guild_id.to_string(),
            admin_roles: Vec::new(),
            stream_notification_channel: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildMember {
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl GuildMember {
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}
