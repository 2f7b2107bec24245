// File: streamwatch-core/tests/live_state_tests.rs

mod test_utils;

use chrono::Utc;
use tokio_test::assert_ok;

use streamwatch_common::models::provider::{LiveStatus, StreamNotification};
use streamwatch_common::traits::repository_traits::StreamRegistry;
use streamwatch_core::Error;
use streamwatch_core::services::LiveTransition;

use test_utils::{bid, Harness};

async fn guild_with_live_role(h: &Harness, guild: &str, channel: &str, role: &str) -> Result<(), Error> {
    h.registry.set_stream_notification_channel(guild, Some(channel)).await?;
    h.engine.add_live_stream_rule(guild, role).await?;
    Ok(())
}

#[tokio::test]
async fn two_members_one_post_then_cleanup() -> Result<(), Error> {
    let h = Harness::new();
    guild_with_live_role(&h, "100", "555", "700").await?;
    h.registry.swap_member_link("100", "11", &bid("b1")).await?;
    h.registry.swap_member_link("100", "12", &bid("b1")).await?;

    let t = h.dispatcher.on_online(&bid("b1"), Some(Utc::now())).await?;
    assert_eq!(t, LiveTransition::WentLive);
    assert!(h.guild.has_role("100", "11", "700"));
    assert!(h.guild.has_role("100", "12", "700"));

    let stream = h.registry.stream("b1").expect("stream");
    assert!(stream.is_live);
    assert!(stream.live_since.is_some());
    assert_eq!(stream.alert_posts.len(), 1, "one post per guild, not per member");
    assert_eq!(h.guild.messages().len(), 1);
    assert_eq!(h.guild.messages()[0].0, "555");

    let t = h.dispatcher.on_offline(&bid("b1")).await?;
    assert_eq!(t, LiveTransition::WentOffline);
    assert!(!h.guild.has_role("100", "11", "700"));
    assert!(!h.guild.has_role("100", "12", "700"));
    assert!(h.guild.messages().is_empty());

    let stream = h.registry.stream("b1").expect("stream");
    assert!(!stream.is_live);
    assert!(stream.alert_posts.is_empty());
    Ok(())
}

#[tokio::test]
async fn repeated_edges_are_unchanged() -> Result<(), Error> {
    let h = Harness::new();
    guild_with_live_role(&h, "100", "555", "700").await?;
    h.registry.swap_member_link("100", "11", &bid("b1")).await?;

    h.dispatcher.on_online(&bid("b1"), None).await?;
    assert_eq!(h.dispatcher.on_online(&bid("b1"), None).await?, LiveTransition::Unchanged);
    assert_eq!(h.guild.messages().len(), 1);

    h.dispatcher.on_offline(&bid("b1")).await?;
    assert_eq!(h.dispatcher.on_offline(&bid("b1")).await?, LiveTransition::Unchanged);
    Ok(())
}

#[tokio::test]
async fn offline_for_unknown_broadcaster_creates_nothing() -> Result<(), Error> {
    let h = Harness::new();
    assert_eq!(h.dispatcher.on_offline(&bid("ghost")).await?, LiveTransition::Unchanged);
    assert!(h.registry.stream("ghost").is_none());
    Ok(())
}

#[tokio::test]
async fn online_for_unlinked_broadcaster_leaves_no_row() -> Result<(), Error> {
    let h = Harness::new();
    let t = assert_ok!(
        h.dispatcher
            .handle_notification(StreamNotification::Online { broadcaster_id: bid("ghost"), started_at: Utc::now() })
            .await
    );
    assert_eq!(t, LiveTransition::Unchanged);
    assert!(h.registry.stream("ghost").is_none());

    // A later link starts from a clean offline row.
    h.registry.swap_member_link("100", "11", &bid("ghost")).await?;
    assert!(!h.registry.stream("ghost").expect("ghost").is_live);
    Ok(())
}

#[tokio::test]
async fn many_guilds_round_trip() -> Result<(), Error> {
    let h = Harness::new();
    let guilds = [("100", "501"), ("200", "502"), ("300", "503")];
    for (guild, channel) in guilds {
        guild_with_live_role(&h, guild, channel, "700").await?;
        h.registry.swap_member_link(guild, "11", &bid("b1")).await?;
        h.registry.swap_member_link(guild, "12", &bid("b1")).await?;
    }
    // A guild without a notification channel still gets roles, no post.
    h.engine.add_live_stream_rule("400", "701").await?;
    h.registry.swap_member_link("400", "13", &bid("b1")).await?;

    h.dispatcher
        .handle_notification(StreamNotification::Online {
            broadcaster_id: bid("b1"),
            started_at: Utc::now(),
        })
        .await?;

    assert_eq!(h.registry.stream("b1").expect("stream").alert_posts.len(), 3);
    for (guild, _) in guilds {
        assert!(h.guild.has_role(guild, "11", "700"));
        assert!(h.guild.has_role(guild, "12", "700"));
    }
    assert!(h.guild.has_role("400", "13", "701"));

    h.dispatcher
        .handle_notification(StreamNotification::Offline { broadcaster_id: bid("b1") })
        .await?;

    assert!(h.guild.messages().is_empty());
    for (guild, _) in guilds {
        assert!(!h.guild.has_role(guild, "11", "700"));
    }
    assert!(!h.guild.has_role("400", "13", "701"));
    Ok(())
}

#[tokio::test]
async fn member_failure_is_partial_and_others_proceed() -> Result<(), Error> {
    let h = Harness::new();
    guild_with_live_role(&h, "100", "555", "700").await?;
    h.registry.swap_member_link("100", "11", &bid("b1")).await?;
    h.registry.swap_member_link("100", "12", &bid("b1")).await?;
    h.guild.fail_role_ops_for.lock().insert("11".into());

    match h.dispatcher.on_online(&bid("b1"), None).await {
        Err(Error::PartialFailure(f)) => {
            assert_eq!(f.attempted, 2);
            assert_eq!(f.failures[0].item, "100/11");
        }
        other => panic!("expected partial failure, got {:?}", other),
    }
    assert!(h.registry.stream("b1").expect("stream").is_live);
    assert!(h.guild.has_role("100", "12", "700"));
    assert_eq!(h.guild.messages().len(), 1);
    Ok(())
}

#[tokio::test]
async fn force_poll_follows_provider() -> Result<(), Error> {
    let h = Harness::new();
    guild_with_live_role(&h, "100", "555", "700").await?;
    h.registry.swap_member_link("100", "11", &bid("b1")).await?;

    h.provider.set_live("b1", LiveStatus::Live { started_at: None });
    assert_eq!(h.dispatcher.force_poll(&bid("b1")).await?, LiveTransition::WentLive);
    assert!(h.guild.has_role("100", "11", "700"));

    h.provider.set_live("b1", LiveStatus::Unknown);
    assert_eq!(h.dispatcher.force_poll(&bid("b1")).await?, LiveTransition::WentOffline);
    assert!(!h.guild.has_role("100", "11", "700"));
    Ok(())
}

#[tokio::test]
async fn new_link_gets_effects_only_while_live() -> Result<(), Error> {
    let h = Harness::new();
    guild_with_live_role(&h, "100", "555", "700").await?;
    h.registry.swap_member_link("100", "11", &bid("b1")).await?;
    h.dispatcher.on_online(&bid("b1"), None).await?;

    h.registry.swap_member_link("100", "12", &bid("b1")).await?;
    h.dispatcher.apply_for_new_link("100", "12", &bid("b1")).await?;
    assert!(h.guild.has_role("100", "12", "700"));
    assert_eq!(h.guild.messages().len(), 1, "guild already has its post");

    h.dispatcher.on_offline(&bid("b1")).await?;
    h.registry.swap_member_link("100", "13", &bid("b1")).await?;
    h.dispatcher.apply_for_new_link("100", "13", &bid("b1")).await?;
    assert!(!h.guild.has_role("100", "13", "700"));
    Ok(())
}
