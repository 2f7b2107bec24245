// File: streamwatch-core/src/services/roles/member_pages.rs

use std::sync::Arc;

use streamwatch_common::models::guild::GuildMember;
use streamwatch_common::traits::guild_traits::GuildGateway;

use crate::Error;

pub const DEFAULT_PAGE_SIZE: u16 = 512;

/// Walks a guild's member list page by page. The cursor is the highest user
/// id seen so far; an empty page ends the walk.
pub struct MemberPages {
    gateway: Arc<dyn GuildGateway>,
    guild_id: String,
    page_size: u16,
    after: Option<String>,
    done: bool,
}

impl MemberPages {
    pub fn new(gateway: Arc<dyn GuildGateway>, guild_id: &str) -> Self {
        Self::with_page_size(gateway, guild_id, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(gateway: Arc<dyn GuildGateway>, guild_id: &str, page_size: u16) -> Self {
        Self {
            gateway,
            guild_id: guild_id.to_string(),
            page_size: page_size.max(1),
            after: None,
            done: false,
        }
    }

    /// `Ok(None)` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<GuildMember>>, Error> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .gateway
            .list_members(&self.guild_id, self.after.as_deref(), self.page_size)
            .await?;

        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let max_id = page
            .iter()
            .map(|m| m.user_id.as_str())
            .max_by(|a, b| snowflake_cmp(a, b));
        if let Some(max_id) = max_id {
            // A cursor that does not advance would loop forever.
            if self.after.as_deref().is_some_and(|prev| snowflake_cmp(max_id, prev).is_le()) {
                self.done = true;
            } else {
                self.after = Some(max_id.to_string());
            }
        }

        Ok(Some(page))
    }

    /// Every member holding `role_id`.
    pub async fn collect_role_holders(mut self, role_id: &str) -> Result<Vec<GuildMember>, Error> {
        let mut holders = Vec::new();
        while let Some(page) = self.next_page().await? {
            holders.extend(page.into_iter().filter(|m| m.has_role(role_id)));
        }
        Ok(holders)
    }
}

/// Orders decimal snowflakes numerically without parsing them.
fn snowflake_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
