//! War lifecycle engine.
//!
//! One non-Finished war per guild, driven Preparing -> Ongoing ->
//! Finished by cancellable timers. Invitations are separate, 5-minute
//! bookkeeping: no war row exists until the target accepts. The active
//! set lives in [`WarBoard`], owned separately so the alliance engine
//! can check the war side of the mutual exclusion without a cycle.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::alliance::AllianceGraph;
use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::config::Settings;
use crate::db::gateway::PersistenceGateway;
use crate::db::models::{CeasefireRequest, GuildRole, GuildWar, RequestStatus, WarStatus};
use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;
use crate::protocol::Notice;
use crate::timer::{self, TimerHandle};

/// Retry delay when a timer-driven transition cannot reach the store.
const PERSIST_RETRY: Duration = Duration::from_secs(30);

//////////////////////////////////////////////////
// Active set
//////////////////////////////////////////////////

#[derive(Default)]
pub struct WarBoard {
    wars: DashMap<Uuid, GuildWar>,
    by_guild: DashMap<Uuid, Uuid>,
}

impl WarBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn war(&self, war_id: Uuid) -> Option<GuildWar> {
        self.wars.get(&war_id).map(|w| w.clone())
    }

    pub fn active_war_of(&self, guild: Uuid) -> Option<GuildWar> {
        let war_id = *self.by_guild.get(&guild)?;
        self.war(war_id)
    }

    pub fn active_war_between(&self, a: Uuid, b: Uuid) -> Option<GuildWar> {
        self.active_war_of(a).filter(|w| w.involves(b))
    }

    pub fn has_ongoing_war_between(&self, a: Uuid, b: Uuid) -> bool {
        self.active_war_between(a, b)
            .is_some_and(|w| w.status == WarStatus::Ongoing)
    }

    fn insert(&self, war: GuildWar) {
        self.by_guild.insert(war.attacker_id, war.id);
        self.by_guild.insert(war.defender_id, war.id);
        self.wars.insert(war.id, war);
    }

    /// Claims the war: exactly one of several concurrent enders gets it.
    fn take(&self, war_id: Uuid) -> Option<GuildWar> {
        let (_, war) = self.wars.remove(&war_id)?;
        self.by_guild.remove(&war.attacker_id);
        self.by_guild.remove(&war.defender_id);
        Some(war)
    }

    fn update_status(&self, war_id: Uuid, status: WarStatus) {
        if let Some(mut w) = self.wars.get_mut(&war_id) {
            w.status = status;
        }
    }
}

//////////////////////////////////////////////////
// Winner determination (extension point)
//////////////////////////////////////////////////

/// Scoring hook consulted when a war runs its full duration. The
/// shipped rule declares no winner; servers with scoring plug their own.
pub trait WinnerRule: Send + Sync {
    fn winner(&self, war: &GuildWar) -> Option<Uuid>;
}

pub struct NoContest;

impl WinnerRule for NoContest {
    fn winner(&self, _war: &GuildWar) -> Option<Uuid> {
        None
    }
}

//////////////////////////////////////////////////
// Invitations
//////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct WarInvite {
    pub challenger_id: Uuid,
    pub target_id: Uuid,
    pub invited_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct WarTimers {
    prep: Option<TimerHandle>,
    duration: Option<TimerHandle>,
}

//////////////////////////////////////////////////
// Manager
//////////////////////////////////////////////////

pub struct WarManager {
    weak: Weak<WarManager>,
    cache: Arc<EntityCache>,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    settings: Arc<Settings>,
    board: Arc<WarBoard>,
    graph: Arc<AllianceGraph>,
    winner_rule: Arc<dyn WinnerRule>,
    /// (target guild, challenger guild) -> invitation.
    invites: DashMap<(Uuid, Uuid), WarInvite>,
    /// (requester, target, war) -> pending ceasefire.
    ceasefires: DashMap<(Uuid, Uuid, Uuid), CeasefireRequest>,
    cf_sent: DashMap<Uuid, HashSet<(Uuid, Uuid, Uuid)>>,
    cf_received: DashMap<Uuid, HashSet<(Uuid, Uuid, Uuid)>>,
    timers: DashMap<Uuid, WarTimers>,
}

impl WarManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<EntityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        settings: Arc<Settings>,
        board: Arc<WarBoard>,
        graph: Arc<AllianceGraph>,
        winner_rule: Arc<dyn WinnerRule>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| WarManager {
            weak: weak.clone(),
            cache,
            gateway,
            clock,
            sink,
            settings,
            board,
            graph,
            winner_rule,
            invites: DashMap::new(),
            ceasefires: DashMap::new(),
            cf_sent: DashMap::new(),
            cf_received: DashMap::new(),
            timers: DashMap::new(),
        })
    }

    /// Restores unfinished wars from the store and re-arms their timers
    /// with whatever is left of their windows.
    pub async fn reload(&self) -> EngineResult<()> {
        let now = self.clock.now();
        for war in self.gateway.unfinished_wars().await? {
            let prep_deadline =
                war.started_at + ChronoDuration::minutes(self.settings.war_prep_mins as i64);
            let end_deadline =
                prep_deadline + ChronoDuration::minutes(self.settings.war_duration_mins as i64);
            let war_id = war.id;
            let status = war.status;
            self.board.insert(war);
            match status {
                WarStatus::Pending | WarStatus::Preparing => {
                    self.schedule_prep(war_id, remaining(now, prep_deadline));
                }
                WarStatus::Ongoing => {
                    self.schedule_duration(war_id, remaining(now, end_deadline));
                }
                WarStatus::Finished => {}
            }
        }
        for req in self.gateway.pending_ceasefires().await? {
            if self.board.war(req.war_id).is_some() {
                self.index_ceasefire(req);
            }
        }
        log::info!("war board loaded: {} active wars", self.board.wars.len());
        Ok(())
    }

    //////////////////////////////////////////////////
    // Reads
    //////////////////////////////////////////////////

    pub fn active_war_of(&self, guild: Uuid) -> Option<GuildWar> {
        self.board.active_war_of(guild)
    }

    pub fn invite_for(&self, target: Uuid, challenger: Uuid) -> Option<WarInvite> {
        self.invites
            .get(&(target, challenger))
            .map(|i| i.clone())
            .filter(|i| self.clock.now() <= i.expires_at)
    }

    pub fn ceasefires_received_by(&self, guild: Uuid) -> Vec<CeasefireRequest> {
        self.cf_received
            .get(&guild)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.ceasefires.get(k).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    //////////////////////////////////////////////////
    // Invitation phase
    //////////////////////////////////////////////////

    pub async fn invite_to_war(
        &self,
        actor_player: Uuid,
        target_guild: Uuid,
    ) -> EngineResult<WarInvite> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let challenger = actor.guild_id;
        if challenger == target_guild {
            return Err(EngineError::InvalidState("cannot declare war on yourself"));
        }
        let challenger_guild = self
            .cache
            .guild(challenger)
            .ok_or(EngineError::NotFound("guild"))?;
        if self.cache.guild(target_guild).is_none() {
            return Err(EngineError::NotFound("target guild"));
        }
        let min = self.settings.war_min_members;
        if self.cache.member_count(challenger) < min || self.cache.member_count(target_guild) < min
        {
            return Err(EngineError::InvalidState("guild below minimum war size"));
        }
        if self.board.active_war_of(challenger).is_some() {
            return Err(EngineError::Conflict("your guild is already at war"));
        }
        if self.board.active_war_of(target_guild).is_some() {
            return Err(EngineError::Conflict("target guild is already at war"));
        }
        if self.graph.are_allied(challenger, target_guild) {
            return Err(EngineError::Conflict("cannot declare war on an ally"));
        }

        let now = self.clock.now();
        let invite = WarInvite {
            challenger_id: challenger,
            target_id: target_guild,
            invited_by: actor_player,
            issued_at: now,
            expires_at: now + ChronoDuration::seconds(self.settings.war_invite_ttl_secs as i64),
        };
        // Re-inviting refreshes the deadline.
        self.invites
            .insert((target_guild, challenger), invite.clone());

        self.sink
            .broadcast_to_guild(
                target_guild,
                &Notice::WarInvited {
                    challenger_id: challenger,
                    challenger_name: challenger_guild.name,
                    target_id: target_guild,
                    expires_at: invite.expires_at,
                },
                None,
            )
            .await;
        Ok(invite)
    }

    pub async fn accept_war_invitation(
        &self,
        actor_player: Uuid,
        challenger_guild: Uuid,
    ) -> EngineResult<GuildWar> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let target = actor.guild_id;

        let (_, invite) = self
            .invites
            .remove(&(target, challenger_guild))
            .ok_or(EngineError::NotFound("war invitation"))?;
        let now = self.clock.now();
        if now > invite.expires_at {
            // Already removed above; an expired invitation is gone.
            return Err(EngineError::InvalidState("war invitation expired"));
        }

        // The world may have moved while the invitation sat open.
        let min = self.settings.war_min_members;
        if self.cache.member_count(challenger_guild) < min || self.cache.member_count(target) < min
        {
            return Err(EngineError::InvalidState("guild below minimum war size"));
        }
        if self.board.active_war_of(challenger_guild).is_some()
            || self.board.active_war_of(target).is_some()
        {
            return Err(EngineError::Conflict("a side is already at war"));
        }
        if self.graph.are_allied(challenger_guild, target) {
            return Err(EngineError::Conflict("cannot war an ally"));
        }

        let war = GuildWar {
            id: Uuid::new_v4(),
            attacker_id: challenger_guild,
            defender_id: target,
            started_at: now,
            ended_at: None,
            winner_id: None,
            status: WarStatus::Preparing,
        };
        if let Err(e) = self.gateway.create_war(&war).await {
            // Validate-then-commit: no board entry, no timers; the
            // invitation survives so the accept can be retried.
            self.invites.insert((target, challenger_guild), invite);
            return Err(e.into());
        }

        self.board.insert(war.clone());
        let prep = Duration::from_secs(self.settings.war_prep_mins * 60);
        self.schedule_prep(war.id, prep);

        let notice = Notice::WarPreparing {
            war_id: war.id,
            attacker_id: war.attacker_id,
            defender_id: war.defender_id,
            combat_at: now + ChronoDuration::minutes(self.settings.war_prep_mins as i64),
        };
        self.sink
            .broadcast_to_guild(war.attacker_id, &notice, None)
            .await;
        self.sink
            .broadcast_to_guild(war.defender_id, &notice, None)
            .await;
        Ok(war)
    }

    /// Drop invitations past their deadline. Runs on a periodic sweep;
    /// expiry is also enforced on accept.
    pub fn purge_expired_invites(&self) {
        let now = self.clock.now();
        self.invites.retain(|_, i| now <= i.expires_at);
    }

    //////////////////////////////////////////////////
    // Timed transitions
    //////////////////////////////////////////////////

    /// Preparation window elapsed: Preparing -> Ongoing. Timer callback;
    /// a war that ended in the meantime makes this a no-op.
    pub async fn begin_war(&self, war_id: Uuid) {
        let Some(war) = self.board.war(war_id) else {
            return;
        };
        if !matches!(war.status, WarStatus::Pending | WarStatus::Preparing) {
            return;
        }

        let mut updated = war.clone();
        updated.status = WarStatus::Ongoing;
        if let Err(e) = self.gateway.update_war(&updated).await {
            log::error!("war {war_id}: could not persist Ongoing transition: {e}");
            self.schedule_prep(war_id, PERSIST_RETRY);
            return;
        }

        self.board.update_status(war_id, WarStatus::Ongoing);
        self.schedule_duration(
            war_id,
            Duration::from_secs(self.settings.war_duration_mins * 60),
        );

        let notice = Notice::WarStarted {
            war_id,
            attacker_id: updated.attacker_id,
            defender_id: updated.defender_id,
        };
        self.sink
            .broadcast_to_guild(updated.attacker_id, &notice, None)
            .await;
        self.sink
            .broadcast_to_guild(updated.defender_id, &notice, None)
            .await;
    }

    /// Finish a war. Claims the board entry first, so of the duration
    /// timer and a concurrent ceasefire acceptance exactly one proceeds;
    /// the loser observes `Ok(None)` and does nothing.
    pub async fn end_war(&self, war_id: Uuid, forced_draw: bool) -> EngineResult<Option<GuildWar>> {
        let Some(mut war) = self.board.take(war_id) else {
            return Ok(None);
        };

        let prev_status = war.status;
        war.winner_id = if forced_draw {
            None
        } else {
            self.winner_rule.winner(&war)
        };
        war.status = WarStatus::Finished;
        war.ended_at = Some(self.clock.now());

        if let Err(e) = self.gateway.update_war(&war).await {
            // Put the war back and retry the finish shortly; the cache
            // must not run ahead of the store.
            let mut restored = war.clone();
            restored.status = prev_status;
            restored.ended_at = None;
            restored.winner_id = None;
            self.board.insert(restored);
            self.schedule_end_retry(war_id, forced_draw);
            return Err(e.into());
        }

        self.clear_ceasefires_for_war(&war).await;

        let notice = Notice::WarEnded {
            war_id,
            winner_id: war.winner_id,
        };
        self.sink
            .broadcast_to_guild(war.attacker_id, &notice, None)
            .await;
        self.sink
            .broadcast_to_guild(war.defender_id, &notice, None)
            .await;

        // Cancel last, with no awaits left: when the duration timer is
        // the caller, aborting its own task any earlier would kill this
        // function at the next await with the war half-finished. A
        // cancelled-too-late timer is harmless; the board claim above
        // makes a second finish a no-op.
        if let Some((_, timers)) = self.timers.remove(&war_id) {
            if let Some(t) = timers.prep {
                t.cancel();
            }
            if let Some(t) = timers.duration {
                t.cancel();
            }
        }
        Ok(Some(war))
    }

    /// Disband cascade: a dissolving guild forfeits nothing; its war
    /// simply ends with no winner.
    pub async fn end_wars_of_guild(&self, guild: Uuid) -> EngineResult<()> {
        if let Some(war) = self.board.active_war_of(guild) {
            self.end_war(war.id, true).await?;
        }
        self.invites
            .retain(|(t, c), _| *t != guild && *c != guild);
        Ok(())
    }

    //////////////////////////////////////////////////
    // Ceasefire sub-protocol
    //////////////////////////////////////////////////

    pub async fn request_ceasefire(&self, actor_player: Uuid) -> EngineResult<CeasefireRequest> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let guild = actor.guild_id;
        let war = self
            .board
            .active_war_of(guild)
            .ok_or(EngineError::NotFound("active war"))?;
        if war.status != WarStatus::Ongoing {
            return Err(EngineError::InvalidState("war is not ongoing"));
        }
        let target = war
            .other_side(guild)
            .ok_or(EngineError::NotFound("active war"))?;
        if self.ceasefires.contains_key(&(guild, target, war.id)) {
            return Err(EngineError::Conflict("ceasefire already requested"));
        }

        let req = CeasefireRequest {
            id: Uuid::new_v4(),
            requester_id: guild,
            target_id: target,
            war_id: war.id,
            requested_at: self.clock.now(),
            status: RequestStatus::Pending,
        };
        self.gateway.create_ceasefire(&req).await?;
        self.index_ceasefire(req.clone());

        self.sink
            .broadcast_to_guild(
                target,
                &Notice::CeasefireRequested {
                    war_id: war.id,
                    requester_id: guild,
                    target_id: target,
                },
                None,
            )
            .await;
        Ok(req)
    }

    /// Accepting ends the war immediately with no winner.
    pub async fn accept_ceasefire(&self, actor_player: Uuid) -> EngineResult<GuildWar> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let guild = actor.guild_id;
        let war = self
            .board
            .active_war_of(guild)
            .ok_or(EngineError::NotFound("active war"))?;
        let requester = war
            .other_side(guild)
            .ok_or(EngineError::NotFound("active war"))?;

        let (key, mut req) = self
            .ceasefires
            .remove(&(requester, guild, war.id))
            .ok_or(EngineError::NotFound("pending ceasefire request"))?;

        req.status = RequestStatus::Accepted;
        if let Err(e) = self.gateway.update_ceasefire(&req).await {
            req.status = RequestStatus::Pending;
            self.ceasefires.insert(key, req);
            return Err(e.into());
        }
        self.unindex_ceasefire(&key);

        match self.end_war(war.id, true).await? {
            Some(finished) => Ok(finished),
            // The duration timer won the race; the war is already over.
            None => Err(EngineError::InvalidState("war already finished")),
        }
    }

    pub async fn reject_ceasefire(&self, actor_player: Uuid) -> EngineResult<()> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let guild = actor.guild_id;
        let war = self
            .board
            .active_war_of(guild)
            .ok_or(EngineError::NotFound("active war"))?;
        let requester = war
            .other_side(guild)
            .ok_or(EngineError::NotFound("active war"))?;

        let (key, mut req) = self
            .ceasefires
            .remove(&(requester, guild, war.id))
            .ok_or(EngineError::NotFound("pending ceasefire request"))?;

        req.status = RequestStatus::Rejected;
        if let Err(e) = self.gateway.update_ceasefire(&req).await {
            req.status = RequestStatus::Pending;
            self.ceasefires.insert(key, req);
            return Err(e.into());
        }
        self.unindex_ceasefire(&key);

        self.sink
            .broadcast_to_guild(
                requester,
                &Notice::CeasefireRejected {
                    war_id: war.id,
                    requester_id: requester,
                },
                None,
            )
            .await;
        Ok(())
    }

    //////////////////////////////////////////////////
    // Internals
    //////////////////////////////////////////////////

    fn index_ceasefire(&self, req: CeasefireRequest) {
        let key = (req.requester_id, req.target_id, req.war_id);
        self.cf_sent.entry(req.requester_id).or_default().insert(key);
        self.cf_received.entry(req.target_id).or_default().insert(key);
        self.ceasefires.insert(key, req);
    }

    fn unindex_ceasefire(&self, key: &(Uuid, Uuid, Uuid)) {
        if let Some(mut s) = self.cf_sent.get_mut(&key.0) {
            s.remove(key);
        }
        if let Some(mut s) = self.cf_received.get_mut(&key.1) {
            s.remove(key);
        }
    }

    /// Expire any ceasefire requests still scoped to a finished war.
    async fn clear_ceasefires_for_war(&self, war: &GuildWar) {
        let stale: Vec<(Uuid, Uuid, Uuid)> = self
            .ceasefires
            .iter()
            .filter(|r| r.war_id == war.id)
            .map(|r| (r.requester_id, r.target_id, r.war_id))
            .collect();
        for key in stale {
            if let Some((_, mut req)) = self.ceasefires.remove(&key) {
                self.unindex_ceasefire(&key);
                req.status = RequestStatus::Expired;
                if let Err(e) = self.gateway.update_ceasefire(&req).await {
                    log::warn!("ceasefire {}: could not persist expiry: {e}", req.id);
                }
            }
        }
    }

    fn schedule_prep(&self, war_id: Uuid, delay: Duration) {
        let Some(mgr) = self.weak.upgrade() else {
            return;
        };
        let handle = timer::after(delay, async move {
            mgr.begin_war(war_id).await;
        });
        self.timers.entry(war_id).or_default().prep = Some(handle);
    }

    fn schedule_duration(&self, war_id: Uuid, delay: Duration) {
        let Some(mgr) = self.weak.upgrade() else {
            return;
        };
        let handle = timer::after(delay, async move {
            if let Err(e) = mgr.end_war(war_id, false).await {
                log::error!("war {war_id}: duration-elapsed finish failed: {e}");
            }
        });
        self.timers.entry(war_id).or_default().duration = Some(handle);
    }

    fn schedule_end_retry(&self, war_id: Uuid, forced_draw: bool) {
        let Some(mgr) = self.weak.upgrade() else {
            return;
        };
        let handle = timer::after(PERSIST_RETRY, async move {
            if let Err(e) = mgr.end_war(war_id, forced_draw).await {
                log::error!("war {war_id}: finish retry failed: {e}");
            }
        });
        self.timers.entry(war_id).or_default().duration = Some(handle);
    }
}

fn remaining(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}
