//! Alliance engine: the symmetric alliance graph plus the pending
//! request lifecycle.
//!
//! The adjacency lives in [`AllianceGraph`], owned separately from the
//! registry so the war engine can consult it without a dependency cycle.
//! Pending requests are keyed by the ordered (requester, target) pair;
//! removing the entry is the atomic claim that makes a double accept
//! impossible.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::db::gateway::PersistenceGateway;
use crate::db::models::{Alliance, AllianceRequest, GuildRole, RequestStatus};
use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;
use crate::protocol::Notice;
use crate::war::WarBoard;

//////////////////////////////////////////////////
// Adjacency
//////////////////////////////////////////////////

#[derive(Default)]
pub struct AllianceGraph {
    edges: DashMap<Uuid, HashSet<Uuid>>,
}

impl AllianceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn are_allied(&self, a: Uuid, b: Uuid) -> bool {
        self.edges.get(&a).is_some_and(|s| s.contains(&b))
    }

    pub fn allies_of(&self, guild: Uuid) -> Vec<Uuid> {
        self.edges
            .get(&guild)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn link(&self, a: Uuid, b: Uuid) {
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    fn unlink(&self, a: Uuid, b: Uuid) {
        if let Some(mut s) = self.edges.get_mut(&a) {
            s.remove(&b);
        }
        if let Some(mut s) = self.edges.get_mut(&b) {
            s.remove(&a);
        }
    }

    fn clear(&self) {
        self.edges.clear();
    }

    fn drop_guild(&self, guild: Uuid) -> Vec<Uuid> {
        let former: Vec<Uuid> = self
            .edges
            .remove(&guild)
            .map(|(_, s)| s.into_iter().collect())
            .unwrap_or_default();
        for ally in &former {
            if let Some(mut s) = self.edges.get_mut(ally) {
                s.remove(&guild);
            }
        }
        former
    }
}

//////////////////////////////////////////////////
// Registry
//////////////////////////////////////////////////

pub struct AllianceRegistry {
    cache: Arc<EntityCache>,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    graph: Arc<AllianceGraph>,
    wars: Arc<WarBoard>,
    /// Pending requests by ordered (requester, target) pair.
    pending: DashMap<(Uuid, Uuid), AllianceRequest>,
    /// Mirror views: requester -> targets, target -> requesters.
    sent: DashMap<Uuid, HashSet<Uuid>>,
    received: DashMap<Uuid, HashSet<Uuid>>,
}

impl AllianceRegistry {
    pub fn new(
        cache: Arc<EntityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        graph: Arc<AllianceGraph>,
        wars: Arc<WarBoard>,
    ) -> Self {
        AllianceRegistry {
            cache,
            gateway,
            clock,
            sink,
            graph,
            wars,
            pending: DashMap::new(),
            sent: DashMap::new(),
            received: DashMap::new(),
        }
    }

    pub async fn reload(&self) -> EngineResult<()> {
        self.graph.clear();
        self.pending.clear();
        self.sent.clear();
        self.received.clear();

        for alliance in self.gateway.all_alliances().await? {
            self.graph.link(alliance.a, alliance.b);
        }
        for req in self.gateway.pending_alliance_requests().await? {
            self.index_request(req);
        }
        Ok(())
    }

    fn index_request(&self, req: AllianceRequest) {
        self.sent
            .entry(req.requester_id)
            .or_default()
            .insert(req.target_id);
        self.received
            .entry(req.target_id)
            .or_default()
            .insert(req.requester_id);
        self.pending
            .insert((req.requester_id, req.target_id), req);
    }

    fn unindex_request(&self, requester: Uuid, target: Uuid) {
        if let Some(mut s) = self.sent.get_mut(&requester) {
            s.remove(&target);
        }
        if let Some(mut s) = self.received.get_mut(&target) {
            s.remove(&requester);
        }
    }

    fn has_pending_between(&self, a: Uuid, b: Uuid) -> bool {
        self.pending.contains_key(&(a, b)) || self.pending.contains_key(&(b, a))
    }

    //////////////////////////////////////////////////
    // Reads
    //////////////////////////////////////////////////

    pub fn are_allied(&self, a: Uuid, b: Uuid) -> bool {
        self.graph.are_allied(a, b)
    }

    pub fn alliances_of(&self, guild: Uuid) -> Vec<Uuid> {
        self.graph.allies_of(guild)
    }

    pub fn requests_sent_by(&self, guild: Uuid) -> Vec<AllianceRequest> {
        self.sent
            .get(&guild)
            .map(|targets| {
                targets
                    .iter()
                    .filter_map(|t| self.pending.get(&(guild, *t)).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn requests_received_by(&self, guild: Uuid) -> Vec<AllianceRequest> {
        self.received
            .get(&guild)
            .map(|requesters| {
                requesters
                    .iter()
                    .filter_map(|r| self.pending.get(&(*r, guild)).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    //////////////////////////////////////////////////
    // Lifecycle
    //////////////////////////////////////////////////

    pub async fn send_request(&self, requester: Uuid, target: Uuid) -> EngineResult<AllianceRequest> {
        if requester == target {
            return Err(EngineError::InvalidState("cannot ally with yourself"));
        }
        let requester_guild = self
            .cache
            .guild(requester)
            .ok_or(EngineError::NotFound("requester guild"))?;
        if self.cache.guild(target).is_none() {
            return Err(EngineError::NotFound("target guild"));
        }
        if self.graph.are_allied(requester, target) {
            return Err(EngineError::Conflict("already allied"));
        }
        if self.wars.active_war_between(requester, target).is_some() {
            return Err(EngineError::Conflict("at war with that guild"));
        }
        if self.has_pending_between(requester, target) {
            return Err(EngineError::Conflict("a request is already pending"));
        }

        // Reclaim slots held by accepted/rejected history between the
        // pair so the fresh request can be inserted.
        self.gateway
            .delete_settled_requests_between(requester, target)
            .await?;

        let req = AllianceRequest {
            id: Uuid::new_v4(),
            requester_id: requester,
            target_id: target,
            requested_at: self.clock.now(),
            status: RequestStatus::Pending,
        };
        self.gateway.create_alliance_request(&req).await?;
        self.index_request(req.clone());

        self.sink
            .broadcast_to_guild(
                target,
                &Notice::AllianceRequested {
                    requester_id: requester,
                    requester_name: requester_guild.name,
                    target_id: target,
                },
                None,
            )
            .await;
        Ok(req)
    }

    /// Target guild accepts the pending request from `requester`. The
    /// map removal is the claim: of two concurrent accepts exactly one
    /// sees the entry.
    pub async fn accept(&self, target: Uuid, requester: Uuid) -> EngineResult<Alliance> {
        let (_, mut req) = self
            .pending
            .remove(&(requester, target))
            .ok_or(EngineError::NotFound("pending alliance request"))?;

        // The pair may have gone to war while the request sat open.
        if self.wars.active_war_between(requester, target).is_some() {
            self.pending.insert((requester, target), req);
            return Err(EngineError::Conflict("at war with that guild"));
        }

        req.status = RequestStatus::Accepted;
        let alliance = Alliance::between(requester, target, self.clock.now());

        if let Err(e) = self.gateway.update_alliance_request(&req).await {
            req.status = RequestStatus::Pending;
            self.pending.insert((requester, target), req);
            return Err(e.into());
        }
        if let Err(e) = self.gateway.create_alliance(&alliance).await {
            req.status = RequestStatus::Pending;
            let _ = self.gateway.update_alliance_request(&req).await;
            self.pending.insert((requester, target), req);
            return Err(e.into());
        }

        self.unindex_request(requester, target);
        self.graph.link(requester, target);

        let notice = Notice::AllianceFormed {
            a: requester,
            b: target,
        };
        self.sink.broadcast_to_guild(requester, &notice, None).await;
        self.sink.broadcast_to_guild(target, &notice, None).await;
        Ok(alliance)
    }

    pub async fn reject(&self, target: Uuid, requester: Uuid) -> EngineResult<()> {
        let (_, mut req) = self
            .pending
            .remove(&(requester, target))
            .ok_or(EngineError::NotFound("pending alliance request"))?;

        req.status = RequestStatus::Rejected;
        if let Err(e) = self.gateway.update_alliance_request(&req).await {
            req.status = RequestStatus::Pending;
            self.pending.insert((requester, target), req);
            return Err(e.into());
        }

        self.unindex_request(requester, target);
        self.sink
            .broadcast_to_guild(
                requester,
                &Notice::AllianceRejected {
                    requester_id: requester,
                    target_id: target,
                },
                None,
            )
            .await;
        Ok(())
    }

    /// Operator-forced alliance, skipping the request handshake. The
    /// war mutual exclusion still applies.
    pub async fn create_direct(&self, a: Uuid, b: Uuid) -> EngineResult<Alliance> {
        if a == b {
            return Err(EngineError::InvalidState("cannot ally with yourself"));
        }
        if self.cache.guild(a).is_none() || self.cache.guild(b).is_none() {
            return Err(EngineError::NotFound("guild"));
        }
        if self.graph.are_allied(a, b) {
            return Err(EngineError::Conflict("already allied"));
        }
        if self.wars.active_war_between(a, b).is_some() {
            return Err(EngineError::Conflict("at war with that guild"));
        }

        let alliance = Alliance::between(a, b, self.clock.now());
        self.gateway.create_alliance(&alliance).await?;
        self.graph.link(a, b);

        let notice = Notice::AllianceFormed { a, b };
        self.sink.broadcast_to_guild(a, &notice, None).await;
        self.sink.broadcast_to_guild(b, &notice, None).await;
        Ok(alliance)
    }

    /// Dissolve the edge. The acting player must own one of the two
    /// guilds.
    pub async fn break_alliance(&self, actor_player: Uuid, a: Uuid, b: Uuid) -> EngineResult<()> {
        let actor = self
            .cache
            .member(actor_player)
            .ok_or(EngineError::NotFound("membership"))?;
        if actor.guild_id != a && actor.guild_id != b {
            return Err(EngineError::PermissionDenied("not a member of either side"));
        }
        if actor.role != GuildRole::Owner {
            return Err(EngineError::PermissionDenied("owner rank required"));
        }
        if !self.graph.are_allied(a, b) {
            return Err(EngineError::NotFound("alliance"));
        }

        self.gateway.delete_alliance(a, b).await?;
        self.graph.unlink(a, b);

        let notice = Notice::AllianceBroken { a, b };
        self.sink.broadcast_to_guild(a, &notice, None).await;
        self.sink.broadcast_to_guild(b, &notice, None).await;
        Ok(())
    }

    /// Disband cascade: drop every edge and request involving the guild.
    pub async fn drop_guild(&self, guild: Uuid) -> EngineResult<()> {
        for ally in self.graph.allies_of(guild) {
            self.gateway.delete_alliance(guild, ally).await?;
        }
        self.gateway.delete_requests_with_guild(guild).await?;

        self.graph.drop_guild(guild);
        self.pending
            .retain(|(r, t), _| *r != guild && *t != guild);
        self.sent.remove(&guild);
        self.received.remove(&guild);
        for mut entry in self.sent.iter_mut() {
            entry.value_mut().remove(&guild);
        }
        for mut entry in self.received.iter_mut() {
            entry.value_mut().remove(&guild);
        }
        Ok(())
    }
}
