//! Shared harness: the engine over the in-memory gateway, the capture
//! sink and a manually advanced clock.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use guildhall_server::cache::EntityCache;
use guildhall_server::clock::ManualClock;
use guildhall_server::config::Settings;
use guildhall_server::db::memory::MemoryGateway;
use guildhall_server::db::models::{Guild, GuildRole};
use guildhall_server::engine::Engine;
use guildhall_server::notify::CaptureSink;

pub struct TestEnv {
    pub engine: Arc<Engine>,
    pub gateway: Arc<MemoryGateway>,
    pub sink: Arc<CaptureSink>,
    pub clock: Arc<ManualClock>,
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn env() -> TestEnv {
    env_with(Settings::default())
}

pub fn env_with(settings: Settings) -> TestEnv {
    let gateway = Arc::new(MemoryGateway::new());
    let clock = ManualClock::starting_at(epoch());
    let cache = Arc::new(EntityCache::new(
        gateway.clone(),
        clock.clone(),
        &settings,
    ));
    let sink = Arc::new(CaptureSink::new(cache.clone()));
    let engine = Engine::new(
        cache,
        gateway.clone(),
        sink.clone(),
        clock.clone(),
        settings,
    );
    TestEnv {
        engine,
        gateway,
        sink,
        clock,
    }
}

impl TestEnv {
    /// Creates a guild with `size` members: an Owner, an Admin (when
    /// size > 1), the rest plain Members. Returns the guild and the
    /// player ids in that order.
    pub async fn make_guild(&self, name: &str, tag: &str, size: usize) -> (Guild, Vec<Uuid>) {
        assert!(size >= 1);
        let owner = Uuid::new_v4();
        let guild = self
            .engine
            .cache
            .create_guild(name, tag, "", owner, &format!("{name}-owner"), false)
            .await
            .expect("guild creation");

        let mut players = vec![owner];
        for i in 1..size {
            let pid = Uuid::new_v4();
            let role = if i == 1 {
                GuildRole::Admin
            } else {
                GuildRole::Member
            };
            self.engine
                .cache
                .add_member(guild.id, pid, &format!("{name}-{i}"), role)
                .await
                .expect("member add");
            players.push(pid);
        }
        (guild, players)
    }

    pub fn all_online(&self, players: &[Uuid]) {
        for p in players {
            self.sink.set_online(*p, true);
        }
    }

    /// Move the manual clock and, in paused-time tests, the tokio clock
    /// together, then let spawned timer callbacks run.
    pub async fn advance(&self, d: chrono::Duration) {
        // Let any just-spawned timer tasks be polled so their `sleep`
        // deadlines are registered with the paused-time driver before we
        // move the clock; otherwise the advance steps past a deadline the
        // driver has not yet seen and the callback never fires.
        settle().await;
        self.clock.advance(d);
        tokio::time::advance(d.to_std().expect("non-negative advance")).await;
        settle().await;
    }
}

/// Let ready timer callbacks finish on the current-thread runtime.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
