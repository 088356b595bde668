//! Notification fan-out to online players.
//!
//! Production delivery is Redis pub/sub on per-player channels, gated by
//! the presence keys the session layer maintains. The engine only sees
//! the [`NotificationSink`] trait.

use async_trait::async_trait;
use dashmap::DashSet;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::protocol::Notice;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver to one player; silently a no-op if they are offline.
    async fn send_to_player(&self, player_id: Uuid, notice: &Notice);

    /// Deliver to every online member of the guild, optionally excluding
    /// one player (usually the actor).
    async fn broadcast_to_guild(&self, guild_id: Uuid, notice: &Notice, exclude: Option<Uuid>);
}

//////////////////////////////////////////////////
// Redis delivery
//////////////////////////////////////////////////

pub struct RedisNotifier {
    redis: RedisClient,
    cache: Arc<EntityCache>,
}

impl RedisNotifier {
    pub fn new(redis: RedisClient, cache: Arc<EntityCache>) -> Self {
        RedisNotifier { redis, cache }
    }

    async fn publish(&self, player_id: Uuid, notice: &Notice) {
        let payload = match serde_json::to_string(notice) {
            Ok(p) => p,
            Err(e) => {
                log::error!("notice serialization failed: {e}");
                return;
            }
        };
        if let Ok(mut conn) = self.redis.get_multiplexed_async_connection().await {
            // Presence = live session key, kept fresh by the session layer.
            let online: bool = conn
                .exists(format!("session:{player_id}"))
                .await
                .unwrap_or(false);
            if !online {
                return;
            }
            let _: () = conn
                .publish(format!("player:{player_id}:events"), payload)
                .await
                .unwrap_or(());
        }
    }
}

#[async_trait]
impl NotificationSink for RedisNotifier {
    async fn send_to_player(&self, player_id: Uuid, notice: &Notice) {
        self.publish(player_id, notice).await;
    }

    async fn broadcast_to_guild(&self, guild_id: Uuid, notice: &Notice, exclude: Option<Uuid>) {
        for member in self.cache.members_of(guild_id) {
            if Some(member.player_id) == exclude {
                continue;
            }
            self.publish(member.player_id, notice).await;
        }
    }
}

//////////////////////////////////////////////////
// In-process capture (test-suite)
//////////////////////////////////////////////////

/// Records deliveries instead of publishing them; the integration suite
/// asserts against the captured stream. Players count as online only
/// after `set_online`.
pub struct CaptureSink {
    cache: Arc<EntityCache>,
    online: DashSet<Uuid>,
    delivered: Mutex<Vec<(Uuid, Notice)>>,
}

impl CaptureSink {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        CaptureSink {
            cache,
            online: DashSet::new(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, player_id: Uuid, online: bool) {
        if online {
            self.online.insert(player_id);
        } else {
            self.online.remove(&player_id);
        }
    }

    pub fn delivered(&self) -> Vec<(Uuid, Notice)> {
        self.delivered.lock().expect("sink poisoned").clone()
    }

    pub fn delivered_to(&self, player_id: Uuid) -> Vec<Notice> {
        self.delivered()
            .into_iter()
            .filter(|(p, _)| *p == player_id)
            .map(|(_, n)| n)
            .collect()
    }

    pub fn clear(&self) {
        self.delivered.lock().expect("sink poisoned").clear();
    }
}

#[async_trait]
impl NotificationSink for CaptureSink {
    async fn send_to_player(&self, player_id: Uuid, notice: &Notice) {
        if self.online.contains(&player_id) {
            self.delivered
                .lock()
                .expect("sink poisoned")
                .push((player_id, notice.clone()));
        }
    }

    async fn broadcast_to_guild(&self, guild_id: Uuid, notice: &Notice, exclude: Option<Uuid>) {
        for member in self.cache.members_of(guild_id) {
            if Some(member.player_id) == exclude {
                continue;
            }
            self.send_to_player(member.player_id, notice).await;
        }
    }
}
