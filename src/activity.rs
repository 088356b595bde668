//! Guild activity scheduling: planned events with capped participation,
//! a tiered reminder ladder and clock-driven status progression.
//!
//! The sweep runs once per interval and advances every activity by
//! comparing wall-clock against its window; reminders are idempotent
//! per (activity, threshold) pair no matter how many ticks observe the
//! same window.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::db::gateway::PersistenceGateway;
use crate::db::models::{
    ActivityKind, ActivityParticipant, ActivityStatus, GuildActivity, GuildRole,
    ParticipantStatus,
};
use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;
use crate::protocol::Notice;

/// Minutes-before-start at which reminders go out.
pub const REMINDER_LADDER: [i64; 5] = [60, 30, 15, 5, 1];

pub struct ActivityScheduler {
    cache: Arc<EntityCache>,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    activities: DashMap<Uuid, GuildActivity>,
    by_guild: DashMap<Uuid, HashSet<Uuid>>,
    participants: DashMap<Uuid, Vec<ActivityParticipant>>,
    /// (activity, threshold) pairs already delivered.
    reminded: DashMap<(Uuid, i64), ()>,
}

impl ActivityScheduler {
    pub fn new(
        cache: Arc<EntityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        ActivityScheduler {
            cache,
            gateway,
            clock,
            sink,
            activities: DashMap::new(),
            by_guild: DashMap::new(),
            participants: DashMap::new(),
            reminded: DashMap::new(),
        }
    }

    pub async fn reload(&self) -> EngineResult<()> {
        self.activities.clear();
        self.by_guild.clear();
        self.participants.clear();

        for a in self.gateway.all_activities().await? {
            self.index_activity(a);
        }
        for p in self.gateway.all_participants().await? {
            self.participants.entry(p.activity_id).or_default().push(p);
        }
        log::info!("activity cache loaded: {} activities", self.activities.len());
        Ok(())
    }

    fn index_activity(&self, a: GuildActivity) {
        self.by_guild.entry(a.guild_id).or_default().insert(a.id);
        self.activities.insert(a.id, a);
    }

    //////////////////////////////////////////////////
    // Reads
    //////////////////////////////////////////////////

    pub fn activity(&self, id: Uuid) -> Option<GuildActivity> {
        self.activities.get(&id).map(|a| a.clone())
    }

    /// Activities of a guild with their clock-derived status applied.
    pub fn activities_of(&self, guild: Uuid) -> Vec<GuildActivity> {
        let now = self.clock.now();
        self.by_guild
            .get(&guild)
            .map(|ids| {
                let mut list: Vec<GuildActivity> = ids
                    .iter()
                    .filter_map(|id| self.activity(*id))
                    .map(|mut a| {
                        a.status = a.observed_status(now);
                        a
                    })
                    .collect();
                list.sort_by_key(|a| a.starts_at);
                list
            })
            .unwrap_or_default()
    }

    pub fn participants_of(&self, activity: Uuid) -> Vec<ActivityParticipant> {
        self.participants
            .get(&activity)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    //////////////////////////////////////////////////
    // Lifecycle
    //////////////////////////////////////////////////

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        creator_player: Uuid,
        name: &str,
        description: &str,
        kind: ActivityKind,
        starts_at: chrono::DateTime<chrono::Utc>,
        ends_at: chrono::DateTime<chrono::Utc>,
        location: &str,
        max_participants: i32,
    ) -> EngineResult<GuildActivity> {
        let creator = self
            .cache
            .member(creator_player)
            .ok_or(EngineError::NotFound("membership"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidState("activity name is required"));
        }
        if max_participants < 0 {
            return Err(EngineError::InvalidState("negative participant cap"));
        }
        let now = self.clock.now();
        if starts_at <= now {
            return Err(EngineError::InvalidState("activity must start in the future"));
        }
        if ends_at <= starts_at {
            return Err(EngineError::InvalidState("activity must end after it starts"));
        }

        let activity = GuildActivity {
            id: Uuid::new_v4(),
            guild_id: creator.guild_id,
            name: name.to_string(),
            description: description.to_string(),
            kind,
            creator_id: creator_player,
            starts_at,
            ends_at,
            location: location.to_string(),
            max_participants,
            created_at: now,
            status: ActivityStatus::Planned,
        };
        self.gateway.create_activity(&activity).await?;
        self.index_activity(activity.clone());
        Ok(activity)
    }

    pub async fn join(&self, player: Uuid, activity_id: Uuid) -> EngineResult<ActivityParticipant> {
        let activity = self
            .activity(activity_id)
            .ok_or(EngineError::NotFound("activity"))?;
        let member = self
            .cache
            .member(player)
            .ok_or(EngineError::NotFound("membership"))?;
        if member.guild_id != activity.guild_id {
            return Err(EngineError::PermissionDenied("not your guild's activity"));
        }

        let now = self.clock.now();
        if activity.observed_status(now) != ActivityStatus::Planned {
            return Err(EngineError::InvalidState("activity is no longer open"));
        }
        let roster = self.participants_of(activity_id);
        if roster.iter().any(|p| p.player_id == player) {
            return Err(EngineError::Conflict("already registered"));
        }
        if activity.max_participants > 0 && roster.len() >= activity.max_participants as usize {
            return Err(EngineError::CapacityExceeded("activity is full"));
        }

        let participant = ActivityParticipant {
            id: Uuid::new_v4(),
            activity_id,
            player_id: player,
            display_name: member.display_name,
            status: ParticipantStatus::Registered,
            registered_at: now,
        };
        self.gateway.create_participant(&participant).await?;
        self.participants
            .entry(activity_id)
            .or_default()
            .push(participant.clone());
        Ok(participant)
    }

    pub async fn leave(&self, player: Uuid, activity_id: Uuid) -> EngineResult<()> {
        let activity = self
            .activity(activity_id)
            .ok_or(EngineError::NotFound("activity"))?;
        if activity.observed_status(self.clock.now()) != ActivityStatus::Planned {
            return Err(EngineError::InvalidState("activity is no longer open"));
        }
        let record = self
            .participants_of(activity_id)
            .into_iter()
            .find(|p| p.player_id == player)
            .ok_or(EngineError::NotFound("participant record"))?;

        self.gateway.delete_participant(record.id).await?;
        if let Some(mut roster) = self.participants.get_mut(&activity_id) {
            roster.retain(|p| p.id != record.id);
        }
        Ok(())
    }

    /// Cancel, permitted to the creator, the guild Owner, an Admin, or
    /// an operator override; only from Planned/Ongoing. Terminal.
    pub async fn cancel(
        &self,
        actor_player: Uuid,
        activity_id: Uuid,
        operator_override: bool,
    ) -> EngineResult<GuildActivity> {
        let mut activity = self
            .activity(activity_id)
            .ok_or(EngineError::NotFound("activity"))?;

        if !operator_override {
            let actor = self
                .cache
                .member(actor_player)
                .ok_or(EngineError::NotFound("membership"))?;
            let allowed = actor_player == activity.creator_id
                || (actor.guild_id == activity.guild_id
                    && actor.role.at_least(GuildRole::Admin));
            if !allowed {
                return Err(EngineError::PermissionDenied(
                    "creator or admin rank required",
                ));
            }
        }

        match activity.observed_status(self.clock.now()) {
            ActivityStatus::Planned | ActivityStatus::Ongoing => {}
            _ => return Err(EngineError::InvalidState("activity already over")),
        }

        activity.status = ActivityStatus::Cancelled;
        self.gateway.update_activity(&activity).await?;
        self.activities.insert(activity_id, activity.clone());

        self.sink
            .broadcast_to_guild(
                activity.guild_id,
                &Notice::ActivityCancelled {
                    activity_id,
                    name: activity.name.clone(),
                },
                None,
            )
            .await;
        Ok(activity)
    }

    //////////////////////////////////////////////////
    // Sweep
    //////////////////////////////////////////////////

    /// One pass over every cached activity. Runs from the periodic
    /// sweep task; tests drive it directly.
    pub async fn sweep_once(&self) {
        let now = self.clock.now();
        let snapshot: Vec<GuildActivity> =
            self.activities.iter().map(|a| a.clone()).collect();

        for activity in snapshot {
            match activity.status {
                ActivityStatus::Planned => {
                    if now >= activity.starts_at {
                        self.transition(&activity, ActivityStatus::Ongoing).await;
                    } else {
                        self.send_due_reminders(&activity, now).await;
                    }
                }
                ActivityStatus::Ongoing => {
                    if now >= activity.ends_at {
                        self.transition(&activity, ActivityStatus::Completed).await;
                    }
                }
                ActivityStatus::Completed | ActivityStatus::Cancelled => {}
            }
        }
    }

    async fn send_due_reminders(&self, activity: &GuildActivity, now: chrono::DateTime<chrono::Utc>) {
        let minutes_left = (activity.starts_at - now).num_minutes();
        // Every crossed threshold is marked so it can never fire late,
        // but only the tightest one is actually delivered.
        let mut deliver: Option<i64> = None;
        for threshold in REMINDER_LADDER {
            if minutes_left <= threshold
                && self
                    .reminded
                    .insert((activity.id, threshold), ())
                    .is_none()
            {
                deliver = Some(threshold);
            }
        }
        if deliver.is_some() {
            self.sink
                .broadcast_to_guild(
                    activity.guild_id,
                    &Notice::ActivityReminder {
                        activity_id: activity.id,
                        name: activity.name.clone(),
                        minutes_left,
                    },
                    None,
                )
                .await;
        }
    }

    async fn transition(&self, activity: &GuildActivity, to: ActivityStatus) {
        let mut updated = activity.clone();
        updated.status = to;
        if let Err(e) = self.gateway.update_activity(&updated).await {
            // Leave the cached status alone; the next sweep retries.
            log::error!(
                "activity {}: could not persist {} transition: {e}",
                activity.id,
                to.as_str()
            );
            return;
        }
        self.activities.insert(activity.id, updated.clone());

        let notice = match to {
            ActivityStatus::Ongoing => Notice::ActivityStarted {
                activity_id: updated.id,
                name: updated.name.clone(),
            },
            ActivityStatus::Completed => Notice::ActivityEnded {
                activity_id: updated.id,
                name: updated.name.clone(),
            },
            _ => return,
        };
        self.sink
            .broadcast_to_guild(updated.guild_id, &notice, None)
            .await;
    }

    /// Disband cascade.
    pub async fn drop_guild(&self, guild: Uuid) -> EngineResult<()> {
        self.gateway.delete_activities_of_guild(guild).await?;
        if let Some((_, ids)) = self.by_guild.remove(&guild) {
            for id in ids {
                self.activities.remove(&id);
                self.participants.remove(&id);
                self.reminded.retain(|(a, _), _| *a != id);
            }
        }
        Ok(())
    }
}
