//! Ephemeral guild-join invitations.
//!
//! Deliberately never persisted: entries are short-lived and high-churn.
//! One live invitation per invited player (last invite wins), a fixed
//! expiry window, and a periodic sweep that evicts stale entries even if
//! nobody ever reads them.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::config::Settings;
use crate::db::models::{GuildMember, GuildRole};
use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;
use crate::protocol::Notice;

#[derive(Debug, Clone)]
pub struct Invitation {
    pub player_id: Uuid,
    pub guild_id: Uuid,
    pub inviter_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

pub struct InviteTracker {
    cache: Arc<EntityCache>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    ttl_secs: u64,
    invites: DashMap<Uuid, Invitation>,
}

impl InviteTracker {
    pub fn new(
        cache: Arc<EntityCache>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        settings: &Settings,
    ) -> Self {
        InviteTracker {
            cache,
            clock,
            sink,
            ttl_secs: settings.invite_ttl_secs,
            invites: DashMap::new(),
        }
    }

    fn expired(&self, invite: &Invitation, now: DateTime<Utc>) -> bool {
        now - invite.issued_at >= ChronoDuration::seconds(self.ttl_secs as i64)
    }

    pub fn pending_for(&self, player: Uuid) -> Option<Invitation> {
        let invite = self.invites.get(&player)?.clone();
        if self.expired(&invite, self.clock.now()) {
            None
        } else {
            Some(invite)
        }
    }

    /// Issue an invitation. Re-inviting an already-invited player
    /// replaces the previous entry.
    pub async fn invite(&self, inviter_player: Uuid, target_player: Uuid) -> EngineResult<Invitation> {
        let inviter = self
            .cache
            .member(inviter_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !inviter.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        if self.cache.member(target_player).is_some() {
            return Err(EngineError::Conflict("player already belongs to a guild"));
        }
        let guild = self
            .cache
            .guild(inviter.guild_id)
            .ok_or(EngineError::NotFound("guild"))?;

        let invite = Invitation {
            player_id: target_player,
            guild_id: guild.id,
            inviter_id: inviter_player,
            issued_at: self.clock.now(),
        };
        self.invites.insert(target_player, invite.clone());

        self.sink
            .send_to_player(
                target_player,
                &Notice::GuildInvite {
                    guild_id: guild.id,
                    guild_name: guild.name,
                    inviter_id: inviter_player,
                },
            )
            .await;
        Ok(invite)
    }

    /// Accept: joins the guild through the cache (single-membership and
    /// roster-cap checks included), then drops the entry.
    pub async fn accept(&self, player: Uuid, display_name: &str) -> EngineResult<GuildMember> {
        let (_, invite) = self
            .invites
            .remove(&player)
            .ok_or(EngineError::NotFound("invitation"))?;
        if self.expired(&invite, self.clock.now()) {
            self.sink
                .send_to_player(
                    player,
                    &Notice::GuildInviteExpired {
                        guild_id: invite.guild_id,
                    },
                )
                .await;
            return Err(EngineError::InvalidState("invitation expired"));
        }

        let member = match self
            .cache
            .add_member(invite.guild_id, player, display_name, GuildRole::Member)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                // Store write failures keep the invitation answerable.
                if matches!(e, EngineError::Persistence(_)) {
                    self.invites.insert(player, invite);
                }
                return Err(e);
            }
        };

        self.sink
            .broadcast_to_guild(
                invite.guild_id,
                &Notice::MemberJoined {
                    guild_id: invite.guild_id,
                    player_id: player,
                    display_name: member.display_name.clone(),
                },
                Some(player),
            )
            .await;
        Ok(member)
    }

    pub async fn reject(&self, player: Uuid) -> EngineResult<()> {
        let (_, invite) = self
            .invites
            .remove(&player)
            .ok_or(EngineError::NotFound("invitation"))?;
        if self.expired(&invite, self.clock.now()) {
            self.sink
                .send_to_player(
                    player,
                    &Notice::GuildInviteExpired {
                        guild_id: invite.guild_id,
                    },
                )
                .await;
            return Err(EngineError::InvalidState("invitation expired"));
        }

        self.sink
            .send_to_player(
                invite.inviter_id,
                &Notice::GuildInviteDeclined {
                    guild_id: invite.guild_id,
                    player_id: player,
                },
            )
            .await;
        Ok(())
    }

    /// Evict entries past the expiry window, telling the invited player
    /// if they are online.
    pub async fn sweep_once(&self) {
        let now = self.clock.now();
        let stale: Vec<Invitation> = self
            .invites
            .iter()
            .filter(|i| self.expired(i, now))
            .map(|i| i.clone())
            .collect();
        for invite in stale {
            if self.invites.remove(&invite.player_id).is_some() {
                self.sink
                    .send_to_player(
                        invite.player_id,
                        &Notice::GuildInviteExpired {
                            guild_id: invite.guild_id,
                        },
                    )
                    .await;
            }
        }
    }

    /// Disband cascade.
    pub fn drop_guild(&self, guild: Uuid) {
        self.invites.retain(|_, i| i.guild_id != guild);
    }
}
