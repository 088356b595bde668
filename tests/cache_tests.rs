mod common;

use common::env;
use guildhall_server::db::models::GuildRole;
use guildhall_server::error::EngineError;
use uuid::Uuid;

#[tokio::test]
async fn create_and_lookup_by_every_index() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 3).await;

    let cache = &env.engine.cache;
    assert_eq!(cache.guild(guild.id).unwrap().name, "Iron Pact");
    // Name and tag lookups are case-insensitive.
    assert_eq!(cache.guild_by_name("iron pact").unwrap().id, guild.id);
    assert_eq!(cache.guild_by_tag("iron").unwrap().id, guild.id);
    assert_eq!(cache.guild_of_player(players[0]).unwrap().id, guild.id);
    assert_eq!(cache.member_count(guild.id), 3);

    // Misses are absent results, not errors.
    assert!(cache.guild_by_name("nobody").is_none());
    assert!(cache.guild_of_player(Uuid::new_v4()).is_none());
}

#[tokio::test]
async fn name_and_tag_uniqueness() {
    let env = env();
    env.make_guild("Iron Pact", "IRON", 1).await;

    let err = env
        .engine
        .cache
        .create_guild("IRON PACT", "XX", "", Uuid::new_v4(), "o", false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let err = env
        .engine
        .cache
        .create_guild("Other", "iron", "", Uuid::new_v4(), "o", false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn one_membership_per_player() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    let (other, _) = env.make_guild("Riverfolk", "RIVR", 1).await;

    let err = env
        .engine
        .cache
        .add_member(other.id, players[1], "dup", GuildRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // Founding a guild while already a member is equally blocked.
    let err = env
        .engine
        .cache
        .create_guild("Third", "THRD", "", players[0], "o", false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn roster_cap_is_enforced() {
    let mut settings = guildhall_server::config::Settings::default();
    settings.guild_max_members = 2;
    let env = common::env_with(settings);
    let (guild, _) = env.make_guild("Iron Pact", "IRON", 2).await;

    let err = env
        .engine
        .cache
        .add_member(guild.id, Uuid::new_v4(), "late", GuildRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded(_)));
}

#[tokio::test]
async fn write_through_failure_leaves_cache_unchanged() {
    let env = env();
    let (guild, _) = env.make_guild("Iron Pact", "IRON", 1).await;

    env.gateway.set_fail_writes(true);

    let err = env
        .engine
        .cache
        .add_member(guild.id, Uuid::new_v4(), "ghost", GuildRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(env.engine.cache.member_count(guild.id), 1);

    let err = env
        .engine
        .cache
        .create_guild("Phantom", "PHAN", "", Uuid::new_v4(), "o", false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(env.engine.cache.guild_by_name("Phantom").is_none());

    env.gateway.set_fail_writes(false);
    // The store was never touched either, so a reload agrees.
    env.engine.cache.reload().await.unwrap();
    assert!(env.engine.cache.guild_by_name("Phantom").is_none());
    assert_eq!(env.engine.cache.member_count(guild.id), 1);
}

#[tokio::test]
async fn reload_rebuilds_indexes_from_store() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 3).await;

    env.engine.cache.reload().await.unwrap();

    assert_eq!(env.engine.cache.guild_by_tag("IRON").unwrap().id, guild.id);
    assert_eq!(env.engine.cache.member_count(guild.id), 3);
    assert_eq!(
        env.engine.cache.member(players[1]).unwrap().role,
        GuildRole::Admin
    );
}

#[tokio::test]
async fn promote_and_demote_step_one_rank() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let owner = players[0];
    let member = players[2];

    let m = env.engine.cache.promote(owner, member).await.unwrap();
    assert_eq!(m.role, GuildRole::Elder);
    let m = env.engine.cache.promote(owner, member).await.unwrap();
    assert_eq!(m.role, GuildRole::Admin);
    // Admin is the highest grantable rank.
    let err = env.engine.cache.promote(owner, member).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let m = env.engine.cache.demote(owner, member).await.unwrap();
    assert_eq!(m.role, GuildRole::Elder);
}

#[tokio::test]
async fn admin_cannot_promote_to_own_rank_or_touch_equals() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let admin = players[1];
    let member = players[2];

    let m = env.engine.cache.promote(admin, member).await.unwrap();
    assert_eq!(m.role, GuildRole::Elder);
    // Elder -> Admin would mint an equal; only the owner can.
    let err = env.engine.cache.promote(admin, member).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    let err = env.engine.cache.demote(member, admin).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn transfer_keeps_exactly_one_owner() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 3).await;
    let owner = players[0];
    let heir = players[2];

    let err = env
        .engine
        .cache
        .transfer_ownership(players[1], heir)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    env.engine.cache.transfer_ownership(owner, heir).await.unwrap();

    let owners: Vec<_> = env
        .engine
        .cache
        .members_of(guild.id)
        .into_iter()
        .filter(|m| m.role == GuildRole::Owner)
        .collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].player_id, heir);
    assert_eq!(
        env.engine.cache.member(owner).unwrap().role,
        GuildRole::Admin
    );
    assert_eq!(env.engine.cache.guild(guild.id).unwrap().owner_id, heir);
}

#[tokio::test]
async fn owner_cannot_leave_but_members_can() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 3).await;

    let err = env.engine.cache.remove_member(players[0]).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    env.engine.cache.remove_member(players[2]).await.unwrap();
    assert_eq!(env.engine.cache.member_count(guild.id), 2);
    assert!(env.engine.cache.member(players[2]).is_none());
}

#[tokio::test]
async fn kick_respects_rank_order() {
    let env = env();
    let (_, players) = env.make_guild("Iron Pact", "IRON", 4).await;
    let owner = players[0];
    let admin = players[1];
    let member = players[3];

    // A plain member cannot kick.
    let err = env.engine.cache.kick_member(member, admin).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    // Admins cannot kick the owner or each other.
    let err = env.engine.cache.kick_member(admin, owner).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    env.engine.cache.kick_member(admin, member).await.unwrap();
    assert!(env.engine.cache.member(member).is_none());
}

#[tokio::test]
async fn experience_levels_up_and_announces() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 2).await;
    env.all_online(&players);

    // Level 0 needs 1500; grant enough for two levels plus change.
    let g = env.engine.grant_experience(guild.id, 4600).await.unwrap();
    assert_eq!(g.level, 2);
    assert_eq!(g.experience, 100);

    let level_ups = env
        .sink
        .delivered()
        .into_iter()
        .filter(|(_, n)| {
            matches!(
                n,
                guildhall_server::protocol::Notice::GuildLevelUp { level: 2, .. }
            )
        })
        .count();
    assert_eq!(level_ups, players.len());
}

#[tokio::test]
async fn disband_cascades_members_and_indexes() {
    let env = env();
    let (guild, players) = env.make_guild("Iron Pact", "IRON", 3).await;

    env.engine.disband_guild(players[0], guild.id).await.unwrap();

    let cache = &env.engine.cache;
    assert!(cache.guild(guild.id).is_none());
    assert!(cache.guild_by_name("Iron Pact").is_none());
    assert!(cache.guild_by_tag("IRON").is_none());
    for p in &players {
        assert!(cache.member(*p).is_none());
    }

    // The tag is reusable immediately.
    env.engine
        .cache
        .create_guild("New Pact", "IRON", "", Uuid::new_v4(), "o", false)
        .await
        .unwrap();
}
