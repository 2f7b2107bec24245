use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentKind {
    Reaction,
    LiveStream,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentKind::Reaction => "reaction",
            AssignmentKind::LiveStream => "live_stream",
        }
    }
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a role handed out by reacting to a specific post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRoleParams {
    pub channel_id: String,
    pub message_id: String,
    /// Unicode emoji, or `name:id` for a guild emoji.
    pub emoji: String,
    /// Remove the member's reaction once the role has been granted.
    #[serde(default)]
    pub clear_after: bool,
    /// The bot puts its own reaction on the post so members can click it.
    #[serde(default)]
    pub initial_react: bool,
    /// Removing the reaction does not take the role away again.
    #[serde(default)]
    pub no_remove: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleAssignment {
    Reaction(ReactionRoleParams),
    LiveStream,
}

impl RoleAssignment {
    pub fn kind(&self) -> AssignmentKind {
        match self {
            RoleAssignment::Reaction(_) => AssignmentKind::Reaction,
            RoleAssignment::LiveStream => AssignmentKind::LiveStream,
        }
    }
}

/// A stored policy describing how a guild role is assigned automatically.
///
/// The definition is kept in its stored shape (`kind` + `params`) so that a
/// row written by an older version, or edited by hand, still loads; call
/// [`ManagedRoleRule::assignment`] to interpret it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedRoleRule {
    pub rule_id: Uuid,
    pub guild_id: String,
    pub role_id: String,
    pub kind: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ManagedRoleRule {
    pub fn reaction(guild_id: &str, role_id: &str, params: ReactionRoleParams) -> Result<Self, Error> {
        Ok(Self {
            rule_id: Uuid::new_v4(),
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
            kind: AssignmentKind::Reaction.as_str().to_string(),
            params: serde_json::to_value(params)?,
            created_at: Utc::now(),
        })
    }

    pub fn live_stream(guild_id: &str, role_id: &str) -> Self {
        Self {
            rule_id: Uuid::new_v4(),
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
            kind: AssignmentKind::LiveStream.as_str().to_string(),
            params: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    /// Interprets the stored definition. Fails for unknown kinds and for
    /// reaction rules whose parameters are missing or malformed.
    pub fn assignment(&self) -> Result<RoleAssignment, Error> {
        match self.kind.as_str() {
            "reaction" => {
                let params: ReactionRoleParams = serde_json::from_value(self.params.clone())
                    .map_err(|e| Error::Parse(format!("rule {} has malformed reaction params: {}", self.rule_id, e)))?;
                Ok(RoleAssignment::Reaction(params))
            }
            "live_stream" => Ok(RoleAssignment::LiveStream),
            other => Err(Error::Parse(format!(
                "rule {} has unknown assignment kind '{}'",
                self.rule_id, other
            ))),
        }
    }
}

/// A reaction added to or removed from a guild message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub user_id: String,
}
