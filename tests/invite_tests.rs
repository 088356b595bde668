//! Invitation tracker tests: ephemeral entries, fixed expiry window,
//! sweep-driven eviction. Driven entirely by the manual clock.

mod common;

use chrono::Duration;
use common::env;
use guildhall_server::db::models::GuildRole;
use guildhall_server::error::EngineError;
use guildhall_server::protocol::Notice;
use uuid::Uuid;

#[tokio::test]
async fn invite_requires_admin_and_a_free_player() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let outsider = Uuid::new_v4();

    // Plain members cannot invite.
    let err = env
        .engine
        .invites
        .invite(players[2], outsider)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    // Players who already belong somewhere cannot be invited.
    let err = env
        .engine
        .invites
        .invite(players[1], players[2])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    env.engine.invites.invite(players[1], outsider).await.unwrap();
    assert!(env.engine.invites.pending_for(outsider).is_some());
}

#[tokio::test]
async fn invited_player_is_told_when_online() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let outsider = Uuid::new_v4();
    env.sink.set_online(outsider, true);

    env.engine.invites.invite(players[0], outsider).await.unwrap();

    let notices = env.sink.delivered_to(outsider);
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::GuildInvite { guild_id, .. } if *guild_id == guild.id)));
}

#[tokio::test]
async fn last_invite_wins() {
    let env = env();
    let (_, a_players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 2).await;
    let outsider = Uuid::new_v4();

    env.engine.invites.invite(a_players[0], outsider).await.unwrap();
    env.engine.invites.invite(b_players[0], outsider).await.unwrap();

    // One live invitation per player: the later guild's.
    let invite = env.engine.invites.pending_for(outsider).unwrap();
    assert_eq!(invite.guild_id, b.id);

    env.engine.invites.accept(outsider, "newcomer").await.unwrap();
    assert_eq!(
        env.engine.cache.guild_of_player(outsider).unwrap().id,
        b.id
    );
}

#[tokio::test]
async fn accept_joins_and_consumes_the_entry() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    env.all_online(&players);
    let outsider = Uuid::new_v4();

    env.engine.invites.invite(players[1], outsider).await.unwrap();
    let member = env.engine.invites.accept(outsider, "newcomer").await.unwrap();
    assert_eq!(member.guild_id, guild.id);
    assert_eq!(member.role, GuildRole::Member);
    assert!(env.engine.invites.pending_for(outsider).is_none());

    // The roster heard about the join.
    assert!(env
        .sink
        .delivered_to(players[0])
        .iter()
        .any(|n| matches!(n, Notice::MemberJoined { .. })));

    // Accepting twice is impossible.
    let err = env
        .engine
        .invites
        .accept(outsider, "newcomer")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn expired_invitations_refuse_accept_and_reject() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let outsider = Uuid::new_v4();

    env.engine.invites.invite(players[0], outsider).await.unwrap();
    // The window is 60 seconds, inclusive at the boundary.
    env.clock.advance(Duration::seconds(60));

    let err = env
        .engine
        .invites
        .accept(outsider, "late")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert!(env.engine.cache.member(outsider).is_none());

    // The expired entry is gone entirely.
    let err = env.engine.invites.reject(outsider).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn reject_notifies_the_inviter() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    env.all_online(&players);
    let outsider = Uuid::new_v4();

    env.engine.invites.invite(players[1], outsider).await.unwrap();
    env.engine.invites.reject(outsider).await.unwrap();

    assert!(env
        .sink
        .delivered_to(players[1])
        .iter()
        .any(|n| matches!(n, Notice::GuildInviteDeclined { .. })));
    assert!(env.engine.invites.pending_for(outsider).is_none());
}

#[tokio::test]
async fn sweep_evicts_stale_entries_and_tells_the_player() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let stale = Uuid::new_v4();
    let fresh = Uuid::new_v4();
    env.sink.set_online(stale, true);

    env.engine.invites.invite(players[0], stale).await.unwrap();
    env.clock.advance(Duration::seconds(45));
    env.engine.invites.invite(players[0], fresh).await.unwrap();
    env.clock.advance(Duration::seconds(20));

    // stale is 65s old, fresh only 20s.
    env.engine.invites.sweep_once().await;

    assert!(env.engine.invites.pending_for(stale).is_none());
    assert!(env.engine.invites.pending_for(fresh).is_some());
    assert!(env
        .sink
        .delivered_to(stale)
        .iter()
        .any(|n| matches!(n, Notice::GuildInviteExpired { .. })));

    // A second sweep finds nothing left to do.
    env.sink.clear();
    env.engine.invites.sweep_once().await;
    assert!(env.sink.delivered().is_empty());
}

#[tokio::test]
async fn store_failure_keeps_the_invitation_answerable() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let outsider = Uuid::new_v4();

    env.engine.invites.invite(players[0], outsider).await.unwrap();

    env.gateway.set_fail_writes(true);
    let err = env
        .engine
        .invites
        .accept(outsider, "newcomer")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(env.engine.invites.pending_for(outsider).is_some());

    env.gateway.set_fail_writes(false);
    env.engine.invites.accept(outsider, "newcomer").await.unwrap();
    assert_eq!(
        env.engine.cache.guild_of_player(outsider).unwrap().id,
        guild.id
    );
}

#[tokio::test]
async fn full_roster_refuses_the_accept() {
    let mut settings = guildhall_server::config::Settings::default();
    settings.guild_max_members = 2;
    let env = common::env_with(settings);
    let (_, players) = env.make_guild("Iron Pact", "IRON", 1).await;
    let outsider_a = Uuid::new_v4();
    let outsider_b = Uuid::new_v4();

    env.engine.invites.invite(players[0], outsider_a).await.unwrap();
    env.engine.invites.invite(players[0], outsider_b).await.unwrap();

    env.engine.invites.accept(outsider_a, "first").await.unwrap();
    let err = env
        .engine
        .invites
        .accept(outsider_b, "second")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded(_)));
}
