// File: streamwatch-core/tests/role_engine_tests.rs

mod test_utils;

use std::sync::atomic::Ordering;

use chrono::Utc;
use uuid::Uuid;

use streamwatch_common::models::role_rule::{ManagedRoleRule, ReactionEvent, ReactionRoleParams};
use streamwatch_common::traits::repository_traits::RoleRuleRepository;
use streamwatch_core::Error;

use test_utils::Harness;

fn params(message_id: &str, emoji: &str) -> ReactionRoleParams {
    ReactionRoleParams {
        channel_id: "300".into(),
        message_id: message_id.into(),
        emoji: emoji.into(),
        clear_after: false,
        initial_react: false,
        no_remove: false,
    }
}

fn reaction(user: &str, message_id: &str, emoji: &str) -> ReactionEvent {
    ReactionEvent {
        guild_id: "100".into(),
        channel_id: "300".into(),
        message_id: message_id.into(),
        emoji: emoji.into(),
        user_id: user.into(),
    }
}

fn malformed_rule(role: &str) -> ManagedRoleRule {
    ManagedRoleRule {
        rule_id: Uuid::new_v4(),
        guild_id: "100".into(),
        role_id: role.into(),
        kind: "reaction".into(),
        params: serde_json::json!({ "initial_react": true }),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn reaction_grants_and_removal_revokes() -> Result<(), Error> {
    let h = Harness::new();
    h.engine.add_reaction_rule("100", "800", params("400", "👍")).await?;

    h.engine.apply_reaction_rule(&reaction("11", "400", "👍")).await?;
    assert!(h.guild.has_role("100", "11", "800"));

    // Other emoji on the same post do nothing.
    h.engine.apply_reaction_rule(&reaction("12", "400", "🎉")).await?;
    assert!(!h.guild.has_role("100", "12", "800"));

    h.engine.undo_reaction_rule(&reaction("11", "400", "👍")).await?;
    assert!(!h.guild.has_role("100", "11", "800"));
    Ok(())
}

#[tokio::test]
async fn clear_after_removes_reaction_and_keeps_role() -> Result<(), Error> {
    let h = Harness::new();
    let mut p = params("400", "blobwave:123");
    p.clear_after = true;
    h.engine.add_reaction_rule("100", "800", p).await?;

    h.engine.apply_reaction_rule(&reaction("11", "400", "blobwave:123")).await?;
    assert!(h.guild.has_role("100", "11", "800"));
    assert_eq!(h.guild.member_reactions_removed(), 1);

    // The removal we caused comes back as a reaction-remove event.
    h.engine.undo_reaction_rule(&reaction("11", "400", "blobwave:123")).await?;
    assert!(h.guild.has_role("100", "11", "800"));
    Ok(())
}

#[tokio::test]
async fn no_remove_keeps_role() -> Result<(), Error> {
    let h = Harness::new();
    let mut p = params("400", "👍");
    p.no_remove = true;
    h.engine.add_reaction_rule("100", "800", p).await?;

    h.engine.apply_reaction_rule(&reaction("11", "400", "👍")).await?;
    h.engine.undo_reaction_rule(&reaction("11", "400", "👍")).await?;
    assert!(h.guild.has_role("100", "11", "800"));
    assert_eq!(h.guild.member_reactions_removed(), 0);
    Ok(())
}

#[tokio::test]
async fn initial_reactions_are_placed_and_rearmed() -> Result<(), Error> {
    let h = Harness::new();
    let mut armed = params("400", "👍");
    armed.initial_react = true;
    h.engine.add_reaction_rule("100", "800", armed).await?;
    h.engine.add_reaction_rule("100", "801", params("401", "👎")).await?;
    assert_eq!(h.guild.reactions_added().len(), 1);

    let report = h.engine.init_reactions("100").await?;
    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        h.guild.reactions_added()[1],
        ("300".to_string(), "400".to_string(), "👍".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn malformed_initial_react_rule_is_reported() -> Result<(), Error> {
    let h = Harness::new();
    let mut armed = params("400", "👍");
    armed.initial_react = true;
    h.engine.add_reaction_rule("100", "800", armed).await?;
    let broken = malformed_rule("801");
    h.rule_repo.insert_rule(&broken).await?;

    match h.engine.init_reactions("100").await {
        Err(Error::PartialFailure(f)) => {
            assert_eq!(f.attempted, 2);
            assert_eq!(f.failures[0].item, broken.rule_id.to_string());
        }
        other => panic!("expected partial failure, got {:?}", other),
    }
    assert_eq!(h.guild.reactions_added().len(), 2, "the healthy rule is still re-armed");
    Ok(())
}

#[tokio::test]
async fn purge_removes_role_from_every_holder() -> Result<(), Error> {
    let h = Harness::new();
    // More members than one page.
    for i in 1..=700u64 {
        let roles: &[&str] = if i % 2 == 0 { &["800", "900"] } else { &["900"] };
        h.guild.add_member("100", &(1000 + i).to_string(), roles);
    }
    h.guild.fail_role_ops_for.lock().insert("1010".into());
    let rule = h.engine.add_reaction_rule("100", "800", params("400", "👍")).await?;

    let report = h.engine.purge_role("100", "800").await?;
    assert_eq!(report.holders, 350);
    assert_eq!(report.failed_members.len(), 1);
    assert_eq!(report.failed_members[0].user_id, "1010");
    assert_eq!(report.failed_members[0].display_name, "member1010");
    assert_eq!(report.rules_undone, 1);
    assert!(report.failed_rules.is_empty());
    assert!(h.guild.list_calls.load(Ordering::SeqCst) >= 2);

    assert!(h.guild.has_role("100", "1010", "800"));
    assert!(!h.guild.has_role("100", "1002", "800"));
    assert!(h.guild.has_role("100", "1002", "900"), "other roles untouched");

    assert_eq!(h.guild.emoji_cleared().len(), 1);
    assert!(h.rule_repo.get_rule(rule.rule_id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn purge_counts_departed_members_as_done() -> Result<(), Error> {
    let h = Harness::new();
    h.guild.add_member("100", "11", &["800"]);
    h.guild.add_member("100", "12", &["800"]);
    h.guild.left_after_listing.lock().insert("11".into());
    h.engine.add_live_stream_rule("100", "800").await?;

    let report = h.engine.purge_role("100", "800").await?;
    assert_eq!(report.holders, 2);
    assert!(report.failed_members.is_empty(), "{:?}", report.failed_members);
    assert!(report.is_success());
    assert!(!h.guild.has_role("100", "12", "800"));
    Ok(())
}

#[tokio::test]
async fn purge_of_unmanaged_role_is_not_found() -> Result<(), Error> {
    let h = Harness::new();
    h.guild.add_member("100", "11", &["800"]);
    assert!(matches!(h.engine.purge_role("100", "800").await, Err(Error::NotFound(_))));
    assert!(h.guild.has_role("100", "11", "800"));
    Ok(())
}

#[tokio::test]
async fn purge_reports_rules_it_could_not_undo() -> Result<(), Error> {
    let h = Harness::new();
    h.guild.add_member("100", "11", &["800"]);
    let broken = malformed_rule("800");
    h.rule_repo.insert_rule(&broken).await?;
    h.engine.add_live_stream_rule("100", "800").await?;

    let report = h.engine.purge_role("100", "800").await?;
    assert!(report.failed_members.is_empty());
    assert!(!h.guild.has_role("100", "11", "800"));
    assert_eq!(report.rules_undone, 1);
    assert_eq!(report.failed_rules.len(), 1);
    assert_eq!(report.failed_rules[0].rule_id, Some(broken.rule_id));
    assert_eq!(h.rule_repo.ids(), vec![broken.rule_id]);
    Ok(())
}

#[tokio::test]
async fn purge_keeps_rule_when_reactions_cannot_be_cleared() -> Result<(), Error> {
    let h = Harness::new();
    h.guild.add_member("100", "11", &["800"]);
    let rule = h.engine.add_reaction_rule("100", "800", params("400", "👍")).await?;
    *h.guild.fail_emoji_clear.lock() = true;

    let report = h.engine.purge_role("100", "800").await?;
    assert!(!report.is_success());
    assert_eq!(report.failed_rules[0].rule_id, Some(rule.rule_id));
    assert!(h.rule_repo.get_rule(rule.rule_id).await?.is_some());
    Ok(())
}
