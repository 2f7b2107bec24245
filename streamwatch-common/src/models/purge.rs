use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct FailedMemberRemoval {
    pub user_id: String,
    pub display_name: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedRuleUndo {
    /// `None` when the rules for the role could not even be listed.
    pub rule_id: Option<Uuid>,
    pub cause: String,
}

/// Outcome of removing a managed role from a whole guild.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PurgeReport {
    pub guild_id: String,
    pub role_id: String,
    /// Members that held the role when the purge started.
    pub holders: usize,
    pub rules_undone: usize,
    pub failed_members: Vec<FailedMemberRemoval>,
    pub failed_rules: Vec<FailedRuleUndo>,
}

impl PurgeReport {
    pub fn is_success(&self) -> bool {
        self.failed_members.is_empty() && self.failed_rules.is_empty()
    }
}
