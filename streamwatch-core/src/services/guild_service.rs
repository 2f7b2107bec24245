// File: streamwatch-core/src/services/guild_service.rs

use std::sync::Arc;

use tracing::{debug, info};

use streamwatch_common::models::guild::GuildConfig;
use streamwatch_common::traits::repository_traits::StreamRegistry;

use crate::Error;

/// Who may run admin operations in a guild.
#[derive(Debug, Clone)]
pub struct AdminCheck<'a> {
    pub guild_id: &'a str,
    pub user_id: &'a str,
    pub member_roles: &'a [String],
    pub is_owner: bool,
}

pub struct GuildService {
    registry: Arc<dyn StreamRegistry>,
    dev_user_id: Option<String>,
}

impl GuildService {
    pub fn new(registry: Arc<dyn StreamRegistry>, dev_user_id: Option<String>) -> Self {
        Self { registry, dev_user_id }
    }

    pub async fn get_or_create_guild(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        self.registry.get_or_create_guild(guild_id).await
    }

    /// Returns `false` if the role already was an admin role.
    pub async fn add_admin_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        let added = self.registry.add_admin_role(guild_id, role_id).await?;
        if added {
            info!("role {} is now an admin role in {}", role_id, guild_id);
        } else {
            debug!("role {} already an admin role in {}", role_id, guild_id);
        }
        Ok(added)
    }

    /// The developer, the guild owner and holders of an admin role.
    pub async fn is_admin(&self, check: &AdminCheck<'_>) -> Result<bool, Error> {
        if self.dev_user_id.as_deref() == Some(check.user_id) || check.is_owner {
            return Ok(true);
        }
        let config = self.registry.get_or_create_guild(check.guild_id).await?;
        Ok(config
            .admin_roles
            .iter()
            .any(|admin| check.member_roles.iter().any(|r| r == admin)))
    }

    pub async fn set_stream_notification_channel(&self, guild_id: &str, channel_id: Option<&str>) -> Result<(), Error> {
        self.registry.set_stream_notification_channel(guild_id, channel_id).await?;
        match channel_id {
            Some(c) => info!("live alerts for {} go to channel {}", guild_id, c),
            None => info!("live alerts disabled for {}", guild_id),
        }
        Ok(())
    }
}
