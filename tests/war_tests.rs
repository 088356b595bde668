//! War lifecycle tests run under paused tokio time so the real prep and
//! duration timers fire deterministically; the manual clock is advanced
//! in lockstep for wall-clock stamps.

mod common;

use chrono::Duration;
use common::{env_with, settle};
use guildhall_server::config::Settings;
use guildhall_server::db::gateway::PersistenceGateway;
use guildhall_server::db::models::WarStatus;
use guildhall_server::error::EngineError;
use guildhall_server::protocol::Notice;
use uuid::Uuid;

fn war_settings() -> Settings {
    Settings {
        war_min_members: 3,
        war_prep_mins: 10,
        war_duration_mins: 60,
        ..Settings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn declare_requires_admin_rank() {
    let env = env_with(war_settings());
    let (_, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, _) = env.make_guild("Riverfolk", "RIVR", 3).await;

    // players[2] is a plain member.
    let err = env
        .engine
        .wars
        .invite_to_war(a_players[2], b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    env.engine.wars.invite_to_war(a_players[1], b.id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn size_and_existence_guards() {
    let env = env_with(war_settings());
    let (_, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (small, _) = env.make_guild("Duo", "DUO", 2).await;

    let err = env
        .engine
        .wars
        .invite_to_war(a_players[0], small.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let err = env
        .engine
        .wars
        .invite_to_war(a_players[0], Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn allies_cannot_declare_war() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, _) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.alliances.create_direct(a.id, b.id).await.unwrap();

    let err = env
        .engine
        .wars
        .invite_to_war(a_players[0], b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test(start_paused = true)]
async fn invitation_expires_after_its_window() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();

    // Five minutes plus a tick.
    env.advance(Duration::seconds(301)).await;

    let err = env
        .engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    // Expiry consumed the invitation.
    let err = env
        .engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn purge_sweep_drops_stale_invitations() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, _) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    assert!(env.engine.wars.invite_for(b.id, a.id).is_some());

    env.advance(Duration::seconds(301)).await;
    env.engine.wars.purge_expired_invites();
    assert!(env.engine.wars.invite_for(b.id, a.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn war_runs_preparing_to_ongoing_to_finished() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;
    env.all_online(&a_players);
    env.all_online(&b_players);

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    let war = env
        .engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();
    assert_eq!(war.status, WarStatus::Preparing);
    assert_eq!(war.attacker_id, a.id);
    assert_eq!(war.defender_id, b.id);

    // Preparation elapses.
    env.advance(Duration::minutes(10)).await;
    let ongoing = env.engine.wars.active_war_of(a.id).unwrap();
    assert_eq!(ongoing.status, WarStatus::Ongoing);
    assert!(env
        .sink
        .delivered_to(b_players[2])
        .iter()
        .any(|n| matches!(n, Notice::WarStarted { .. })));

    // Full duration elapses; the shipped winner rule declares a draw.
    env.advance(Duration::minutes(60)).await;
    assert!(env.engine.wars.active_war_of(a.id).is_none());
    assert!(env.engine.wars.active_war_of(b.id).is_none());

    let finished = &env.gateway.unfinished_wars().await.unwrap();
    assert!(finished.is_empty(), "store must hold only the finished row");
    assert!(env
        .sink
        .delivered_to(a_players[0])
        .iter()
        .any(|n| matches!(n, Notice::WarEnded { winner_id: None, .. })));
}

#[tokio::test(start_paused = true)]
async fn one_active_war_per_guild() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;
    let (_, c_players) = env.make_guild("Stonekin", "STON", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();

    // A third guild cannot rope a belligerent into a second war.
    let err = env
        .engine
        .wars
        .invite_to_war(c_players[0], a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // And a belligerent cannot open a second front.
    let c = env.engine.cache.guild_by_tag("STON").unwrap();
    let err = env
        .engine
        .wars
        .invite_to_war(a_players[0], c.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test(start_paused = true)]
async fn war_blocks_alliance_requests() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();

    let err = env.engine.alliances.send_request(a.id, b.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    let err = env
        .engine
        .alliances
        .create_direct(b.id, a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test(start_paused = true)]
async fn ceasefire_needs_an_ongoing_war() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();

    // Still preparing.
    let err = env
        .engine
        .wars
        .request_ceasefire(b_players[0])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    env.advance(Duration::minutes(10)).await;
    env.engine.wars.request_ceasefire(b_players[0]).await.unwrap();

    // A duplicate from the same side is refused.
    let err = env
        .engine
        .wars
        .request_ceasefire(b_players[1])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test(start_paused = true)]
async fn ceasefire_rejection_notifies_the_requester() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;
    env.all_online(&a_players);
    env.all_online(&b_players);

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();
    env.advance(Duration::minutes(10)).await;

    env.engine.wars.request_ceasefire(b_players[0]).await.unwrap();
    env.engine.wars.reject_ceasefire(a_players[0]).await.unwrap();

    assert!(env
        .sink
        .delivered_to(b_players[1])
        .iter()
        .any(|n| matches!(n, Notice::CeasefireRejected { .. })));
    // The war carries on; the request can be reissued.
    assert_eq!(
        env.engine.wars.active_war_of(a.id).unwrap().status,
        WarStatus::Ongoing
    );
    env.engine.wars.request_ceasefire(b_players[0]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ceasefire_acceptance_forces_a_draw_and_cancels_the_timer() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;
    env.all_online(&a_players);
    env.all_online(&b_players);

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();
    env.advance(Duration::minutes(10)).await;

    env.engine.wars.request_ceasefire(b_players[0]).await.unwrap();
    let finished = env.engine.wars.accept_ceasefire(a_players[0]).await.unwrap();
    assert_eq!(finished.status, WarStatus::Finished);
    assert_eq!(finished.winner_id, None);
    assert!(finished.ended_at.is_some());

    env.sink.clear();

    // The duration timer still fires on schedule; it must be a no-op.
    env.advance(Duration::minutes(60)).await;
    settle().await;
    assert!(env.engine.wars.active_war_of(a.id).is_none());
    assert!(env
        .sink
        .delivered()
        .iter()
        .all(|(_, n)| !matches!(n, Notice::WarEnded { .. })));
}

#[tokio::test(start_paused = true)]
async fn accept_is_validate_then_commit() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();

    env.gateway.set_fail_writes(true);
    let err = env
        .engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    // No war, no timers.
    assert!(env.engine.wars.active_war_of(a.id).is_none());
    assert!(env.gateway.unfinished_wars().await.unwrap().is_empty());

    // The invitation survived the store failure and can be retried.
    env.gateway.set_fail_writes(false);
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();
    assert_eq!(
        env.engine.wars.active_war_of(a.id).unwrap().status,
        WarStatus::Preparing
    );
}

#[tokio::test(start_paused = true)]
async fn reload_rearms_timers_for_unfinished_wars() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 3).await;

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();

    // A fresh engine over the same store picks the war up mid-flight.
    let env2 = {
        let settings = war_settings();
        let gateway = env.gateway.clone();
        let clock = env.clock.clone();
        let cache = std::sync::Arc::new(guildhall_server::cache::EntityCache::new(
            gateway.clone(),
            clock.clone(),
            &settings,
        ));
        let sink = std::sync::Arc::new(guildhall_server::notify::CaptureSink::new(cache.clone()));
        guildhall_server::engine::Engine::new(cache, gateway, sink, clock, settings)
    };
    env2.bootstrap().await.unwrap();

    assert_eq!(
        env2.wars.active_war_of(a.id).unwrap().status,
        WarStatus::Preparing
    );

    env.advance(Duration::minutes(10)).await;
    assert_eq!(
        env2.wars.active_war_of(a.id).unwrap().status,
        WarStatus::Ongoing
    );
}

/// Full arc: A declares on B, B accepts, prep elapses, B asks for a
/// ceasefire, A accepts; the war is a finished draw and a fresh
/// alliance handshake succeeds with no leftover state.
#[tokio::test(start_paused = true)]
async fn end_to_end_war_then_alliance() {
    let env = env_with(war_settings());
    let (a, a_players) = env.make_guild("Iron Pact", "IRON", 5).await;
    let (b, b_players) = env.make_guild("Riverfolk", "RIVR", 5).await;
    env.all_online(&a_players);
    env.all_online(&b_players);

    env.engine.wars.invite_to_war(a_players[0], b.id).await.unwrap();
    env.engine
        .wars
        .accept_war_invitation(b_players[0], a.id)
        .await
        .unwrap();

    env.advance(Duration::minutes(10)).await;
    assert_eq!(
        env.engine.wars.active_war_of(a.id).unwrap().status,
        WarStatus::Ongoing
    );

    env.engine.wars.request_ceasefire(b_players[0]).await.unwrap();
    let finished = env.engine.wars.accept_ceasefire(a_players[0]).await.unwrap();
    assert_eq!(finished.status, WarStatus::Finished);
    assert_eq!(finished.winner_id, None);

    // No leftover pending or conflict state blocks the handshake.
    env.engine.alliances.send_request(a.id, b.id).await.unwrap();
    env.engine.alliances.accept(b.id, a.id).await.unwrap();
    assert!(env.engine.alliances.are_allied(a.id, b.id));
    assert!(!env.engine.has_ongoing_war(a.id, b.id));
}
