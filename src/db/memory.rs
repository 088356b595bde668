//! In-memory gateway used by the integration suite and local tooling.
//!
//! Mirrors the Postgres gateway's observable behavior on DashMaps. The
//! `fail_writes` flag makes every mutating call report a database error,
//! which the write-through tests use to prove the cache stays unchanged.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::db::gateway::{GatewayError, GatewayResult, PersistenceGateway};
use crate::db::models::*;

#[derive(Default)]
pub struct MemoryGateway {
    guilds: DashMap<Uuid, Guild>,
    members: DashMap<Uuid, GuildMember>,
    alliances: DashMap<(Uuid, Uuid), Alliance>,
    alliance_requests: DashMap<Uuid, AllianceRequest>,
    wars: DashMap<Uuid, GuildWar>,
    ceasefires: DashMap<Uuid, CeasefireRequest>,
    activities: DashMap<Uuid, GuildActivity>,
    participants: DashMap<Uuid, ActivityParticipant>,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again with `false`).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> GatewayResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(GatewayError::Database("injected write failure".into()))
        } else {
            Ok(())
        }
    }

    /// Row count across request history, used by cleanup-pass tests.
    pub fn alliance_request_rows(&self) -> usize {
        self.alliance_requests.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_guild(&self, guild: &Guild) -> GatewayResult<()> {
        self.write_guard()?;
        self.guilds.insert(guild.id, guild.clone());
        Ok(())
    }

    async fn update_guild(&self, guild: &Guild) -> GatewayResult<()> {
        self.write_guard()?;
        self.guilds.insert(guild.id, guild.clone());
        Ok(())
    }

    async fn delete_guild(&self, id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.guilds.remove(&id);
        Ok(())
    }

    async fn guild_by_id(&self, id: Uuid) -> GatewayResult<Option<Guild>> {
        Ok(self.guilds.get(&id).map(|g| g.clone()))
    }

    async fn guild_by_name(&self, name: &str) -> GatewayResult<Option<Guild>> {
        let needle = name.to_lowercase();
        Ok(self
            .guilds
            .iter()
            .find(|g| g.name.to_lowercase() == needle)
            .map(|g| g.clone()))
    }

    async fn guild_by_tag(&self, tag: &str) -> GatewayResult<Option<Guild>> {
        let needle = tag.to_lowercase();
        Ok(self
            .guilds
            .iter()
            .find(|g| g.tag.to_lowercase() == needle)
            .map(|g| g.clone()))
    }

    async fn all_guilds(&self) -> GatewayResult<Vec<Guild>> {
        Ok(self.guilds.iter().map(|g| g.clone()).collect())
    }

    async fn create_member(&self, member: &GuildMember) -> GatewayResult<()> {
        self.write_guard()?;
        self.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn update_member(&self, member: &GuildMember) -> GatewayResult<()> {
        self.write_guard()?;
        self.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn delete_member(&self, id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.members.remove(&id);
        Ok(())
    }

    async fn delete_members_of_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.members.retain(|_, m| m.guild_id != guild_id);
        Ok(())
    }

    async fn all_members(&self) -> GatewayResult<Vec<GuildMember>> {
        Ok(self.members.iter().map(|m| m.clone()).collect())
    }

    async fn create_alliance(&self, alliance: &Alliance) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliances
            .insert((alliance.a, alliance.b), alliance.clone());
        Ok(())
    }

    async fn delete_alliance(&self, a: Uuid, b: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliances.remove(&ordered_pair(a, b));
        Ok(())
    }

    async fn all_alliances(&self) -> GatewayResult<Vec<Alliance>> {
        Ok(self.alliances.iter().map(|a| a.clone()).collect())
    }

    async fn create_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliance_requests.insert(req.id, req.clone());
        Ok(())
    }

    async fn update_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliance_requests.insert(req.id, req.clone());
        Ok(())
    }

    async fn delete_settled_requests_between(&self, a: Uuid, b: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliance_requests.retain(|_, r| {
            r.status == RequestStatus::Pending
                || !((r.requester_id == a && r.target_id == b)
                    || (r.requester_id == b && r.target_id == a))
        });
        Ok(())
    }

    async fn delete_requests_with_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.alliance_requests
            .retain(|_, r| r.requester_id != guild_id && r.target_id != guild_id);
        Ok(())
    }

    async fn pending_alliance_requests(&self) -> GatewayResult<Vec<AllianceRequest>> {
        Ok(self
            .alliance_requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .map(|r| r.clone())
            .collect())
    }

    async fn create_war(&self, war: &GuildWar) -> GatewayResult<()> {
        self.write_guard()?;
        self.wars.insert(war.id, war.clone());
        Ok(())
    }

    async fn update_war(&self, war: &GuildWar) -> GatewayResult<()> {
        self.write_guard()?;
        self.wars.insert(war.id, war.clone());
        Ok(())
    }

    async fn unfinished_wars(&self) -> GatewayResult<Vec<GuildWar>> {
        Ok(self
            .wars
            .iter()
            .filter(|w| w.status != WarStatus::Finished)
            .map(|w| w.clone())
            .collect())
    }

    async fn create_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()> {
        self.write_guard()?;
        self.ceasefires.insert(req.id, req.clone());
        Ok(())
    }

    async fn update_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()> {
        self.write_guard()?;
        self.ceasefires.insert(req.id, req.clone());
        Ok(())
    }

    async fn pending_ceasefires(&self) -> GatewayResult<Vec<CeasefireRequest>> {
        Ok(self
            .ceasefires
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .map(|r| r.clone())
            .collect())
    }

    async fn create_activity(&self, activity: &GuildActivity) -> GatewayResult<()> {
        self.write_guard()?;
        self.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn update_activity(&self, activity: &GuildActivity) -> GatewayResult<()> {
        self.write_guard()?;
        self.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn delete_activities_of_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        let doomed: Vec<Uuid> = self
            .activities
            .iter()
            .filter(|a| a.guild_id == guild_id)
            .map(|a| a.id)
            .collect();
        for id in doomed {
            self.activities.remove(&id);
            self.participants.retain(|_, p| p.activity_id != id);
        }
        Ok(())
    }

    async fn all_activities(&self) -> GatewayResult<Vec<GuildActivity>> {
        Ok(self.activities.iter().map(|a| a.clone()).collect())
    }

    async fn create_participant(&self, participant: &ActivityParticipant) -> GatewayResult<()> {
        self.write_guard()?;
        self.participants.insert(participant.id, participant.clone());
        Ok(())
    }

    async fn delete_participant(&self, id: Uuid) -> GatewayResult<()> {
        self.write_guard()?;
        self.participants.remove(&id);
        Ok(())
    }

    async fn all_participants(&self) -> GatewayResult<Vec<ActivityParticipant>> {
        Ok(self.participants.iter().map(|p| p.clone()).collect())
    }
}
