//! Composition root: owns the five subsystems and the orchestration
//! that crosses them (startup reload, background sweeps, the disband
//! cascade). No engine state is ambient; everything is injected here.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::activity::ActivityScheduler;
use crate::alliance::{AllianceGraph, AllianceRegistry};
use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::config::Settings;
use crate::db::gateway::PersistenceGateway;
use crate::db::models::{Guild, GuildRole};
use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;
use crate::protocol::Notice;
use crate::timer::{self, TimerHandle};
use crate::war::{NoContest, WarBoard, WarManager, WinnerRule};

pub struct Engine {
    pub settings: Arc<Settings>,
    pub cache: Arc<EntityCache>,
    pub alliances: Arc<AllianceRegistry>,
    pub wars: Arc<WarManager>,
    pub activities: Arc<ActivityScheduler>,
    pub invites: Arc<crate::invite::InviteTracker>,
    sink: Arc<dyn NotificationSink>,
}

impl Engine {
    /// The cache is built by the caller because the notification sink
    /// needs it for guild broadcasts before the engine exists.
    pub fn new(
        cache: Arc<EntityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Arc<Engine> {
        Self::with_winner_rule(cache, gateway, sink, clock, settings, Arc::new(NoContest))
    }

    pub fn with_winner_rule(
        cache: Arc<EntityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: Settings,
        winner_rule: Arc<dyn WinnerRule>,
    ) -> Arc<Engine> {
        let settings = Arc::new(settings);
        let graph = Arc::new(AllianceGraph::new());
        let board = Arc::new(WarBoard::new());

        let alliances = Arc::new(AllianceRegistry::new(
            Arc::clone(&cache),
            Arc::clone(&gateway),
            Arc::clone(&clock),
            Arc::clone(&sink),
            Arc::clone(&graph),
            Arc::clone(&board),
        ));
        let wars = WarManager::new(
            Arc::clone(&cache),
            Arc::clone(&gateway),
            Arc::clone(&clock),
            Arc::clone(&sink),
            Arc::clone(&settings),
            board,
            graph,
            winner_rule,
        );
        let activities = Arc::new(ActivityScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&gateway),
            Arc::clone(&clock),
            Arc::clone(&sink),
        ));
        let invites = Arc::new(crate::invite::InviteTracker::new(
            Arc::clone(&cache),
            Arc::clone(&clock),
            Arc::clone(&sink),
            &settings,
        ));

        Arc::new(Engine {
            settings,
            cache,
            alliances,
            wars,
            activities,
            invites,
            sink,
        })
    }

    /// Startup: rebuild every cache from the durable store and re-arm
    /// war timers. The only O(n) scan in the system.
    pub async fn bootstrap(&self) -> EngineResult<()> {
        self.cache.reload().await?;
        self.alliances.reload().await?;
        self.wars.reload().await?;
        self.activities.reload().await?;
        Ok(())
    }

    /// Spawn the periodic sweeps. Handles are returned so the caller
    /// owns their lifetime.
    pub fn start_sweeps(self: &Arc<Self>) -> Vec<TimerHandle> {
        let activity = {
            let engine = Arc::clone(self);
            timer::every(
                Duration::from_secs(self.settings.activity_sweep_secs),
                move || {
                    let engine = Arc::clone(&engine);
                    async move { engine.activities.sweep_once().await }
                },
            )
        };
        let invite = {
            let engine = Arc::clone(self);
            timer::every(
                Duration::from_secs(self.settings.invite_sweep_secs),
                move || {
                    let engine = Arc::clone(&engine);
                    async move { engine.invites.sweep_once().await }
                },
            )
        };
        let war_invite = {
            let engine = Arc::clone(self);
            timer::every(
                Duration::from_secs(self.settings.war_invite_purge_secs),
                move || {
                    let engine = Arc::clone(&engine);
                    async move { engine.wars.purge_expired_invites() }
                },
            )
        };
        vec![activity, invite, war_invite]
    }

    /// Whether an ongoing war currently links the pair; exposed beside
    /// `are_allied` for the mutual-exclusion property checks.
    pub fn has_ongoing_war(&self, a: Uuid, b: Uuid) -> bool {
        self.wars
            .active_war_of(a)
            .is_some_and(|w| w.involves(b) && w.status == crate::db::models::WarStatus::Ongoing)
    }

    /// Full disband cascade: war ends as a draw, diplomacy and
    /// activities drop, join invitations die, then guild and roster go.
    pub async fn disband_guild(&self, actor_player: Uuid, guild_id: Uuid) -> EngineResult<Guild> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if actor.guild_id != guild_id || actor.role != GuildRole::Owner {
            return Err(EngineError::PermissionDenied("owner rank required"));
        }

        self.wars.end_wars_of_guild(guild_id).await?;
        self.alliances.drop_guild(guild_id).await?;
        self.activities.drop_guild(guild_id).await?;
        self.invites.drop_guild(guild_id);

        // Tell the roster before the membership records disappear.
        self.sink
            .broadcast_to_guild(guild_id, &Notice::GuildDisbanded { guild_id }, None)
            .await;

        self.cache.disband_guild(guild_id).await
    }

    /// Experience grant with the level-up announcement attached.
    pub async fn grant_experience(&self, guild_id: Uuid, amount: i64) -> EngineResult<Guild> {
        let (guild, gained) = self.cache.grant_experience(guild_id, amount).await?;
        if gained > 0 {
            self.sink
                .broadcast_to_guild(
                    guild_id,
                    &Notice::GuildLevelUp {
                        guild_id,
                        level: guild.level,
                    },
                    None,
                )
                .await;
        }
        Ok(guild)
    }
}
