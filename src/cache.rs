//! Authoritative in-memory copy of the guild and membership tables.
//!
//! Four lookup indexes (id, lowercase name, lowercase tag, player id) are
//! kept in step on every mutation. Writes go durable-store-first: the
//! indexes only change after the gateway reports success, so a failed
//! write can never leave the cache ahead of the store. `reload` is the
//! one permitted O(n) bulk scan.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Settings;
use crate::db::gateway::PersistenceGateway;
use crate::db::models::{Guild, GuildMember, GuildRole};
use crate::error::{EngineError, EngineResult};

pub struct EntityCache {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    max_members: usize,
    guilds: DashMap<Uuid, Guild>,
    by_name: DashMap<String, Uuid>,
    by_tag: DashMap<String, Uuid>,
    /// player id -> membership; a player belongs to at most one guild.
    members: DashMap<Uuid, GuildMember>,
    /// guild id -> player ids.
    roster: DashMap<Uuid, HashSet<Uuid>>,
}

impl EntityCache {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        EntityCache {
            gateway,
            clock,
            max_members: settings.guild_max_members,
            guilds: DashMap::new(),
            by_name: DashMap::new(),
            by_tag: DashMap::new(),
            members: DashMap::new(),
            roster: DashMap::new(),
        }
    }

    /// Rebuild every index from the durable store.
    pub async fn reload(&self) -> EngineResult<()> {
        let guilds = self.gateway.all_guilds().await?;
        let members = self.gateway.all_members().await?;

        self.guilds.clear();
        self.by_name.clear();
        self.by_tag.clear();
        self.members.clear();
        self.roster.clear();

        for g in guilds {
            self.index_guild(g);
        }
        for m in members {
            self.index_member(m);
        }
        log::info!(
            "entity cache loaded: {} guilds, {} members",
            self.guilds.len(),
            self.members.len()
        );
        Ok(())
    }

    fn index_guild(&self, g: Guild) {
        self.by_name.insert(g.name.to_lowercase(), g.id);
        self.by_tag.insert(g.tag.to_lowercase(), g.id);
        self.roster.entry(g.id).or_default();
        self.guilds.insert(g.id, g);
    }

    fn index_member(&self, m: GuildMember) {
        self.roster.entry(m.guild_id).or_default().insert(m.player_id);
        self.members.insert(m.player_id, m);
    }

    //////////////////////////////////////////////////
    // Lookups (miss = absent, never an error)
    //////////////////////////////////////////////////

    pub fn guild(&self, id: Uuid) -> Option<Guild> {
        self.guilds.get(&id).map(|g| g.clone())
    }

    pub fn guild_by_name(&self, name: &str) -> Option<Guild> {
        let id = *self.by_name.get(&name.to_lowercase())?;
        self.guild(id)
    }

    pub fn guild_by_tag(&self, tag: &str) -> Option<Guild> {
        let id = *self.by_tag.get(&tag.to_lowercase())?;
        self.guild(id)
    }

    pub fn member(&self, player_id: Uuid) -> Option<GuildMember> {
        self.members.get(&player_id).map(|m| m.clone())
    }

    pub fn guild_of_player(&self, player_id: Uuid) -> Option<Guild> {
        let m = self.member(player_id)?;
        self.guild(m.guild_id)
    }

    pub fn members_of(&self, guild_id: Uuid) -> Vec<GuildMember> {
        match self.roster.get(&guild_id) {
            Some(players) => players
                .iter()
                .filter_map(|p| self.member(*p))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn member_count(&self, guild_id: Uuid) -> usize {
        self.roster.get(&guild_id).map_or(0, |r| r.len())
    }

    pub fn all_guilds(&self) -> Vec<Guild> {
        self.guilds.iter().map(|g| g.clone()).collect()
    }

    //////////////////////////////////////////////////
    // Guild lifecycle
    //////////////////////////////////////////////////

    pub async fn create_guild(
        &self,
        name: &str,
        tag: &str,
        description: &str,
        owner_id: Uuid,
        owner_name: &str,
        public_join: bool,
    ) -> EngineResult<Guild> {
        let name = name.trim();
        let tag = tag.trim();
        if name.is_empty() || tag.is_empty() {
            return Err(EngineError::InvalidState("name and tag are required"));
        }
        if self.by_name.contains_key(&name.to_lowercase()) {
            return Err(EngineError::Conflict("guild name already taken"));
        }
        if self.by_tag.contains_key(&tag.to_lowercase()) {
            return Err(EngineError::Conflict("guild tag already taken"));
        }
        if self.members.contains_key(&owner_id) {
            return Err(EngineError::Conflict("founder already belongs to a guild"));
        }

        let now = self.clock.now();
        let guild = Guild {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tag: tag.to_string(),
            description: description.to_string(),
            announcement: String::new(),
            owner_id,
            level: 0,
            experience: 0,
            public_join,
            created_at: now,
        };
        let owner = GuildMember {
            id: Uuid::new_v4(),
            guild_id: guild.id,
            player_id: owner_id,
            display_name: owner_name.to_string(),
            role: GuildRole::Owner,
            joined_at: now,
        };

        self.gateway.create_guild(&guild).await?;
        if let Err(e) = self.gateway.create_member(&owner).await {
            // Roll the half-written guild row back; the cache was never
            // touched either way.
            let _ = self.gateway.delete_guild(guild.id).await;
            return Err(e.into());
        }

        self.index_guild(guild.clone());
        self.index_member(owner);
        Ok(guild)
    }

    /// Removes the guild and its roster from store and cache. Diplomacy,
    /// activity and invitation cascades live in the engine, which calls
    /// this last.
    pub async fn disband_guild(&self, guild_id: Uuid) -> EngineResult<Guild> {
        let guild = self
            .guild(guild_id)
            .ok_or(EngineError::NotFound("guild"))?;

        self.gateway.delete_members_of_guild(guild_id).await?;
        self.gateway.delete_guild(guild_id).await?;

        if let Some((_, players)) = self.roster.remove(&guild_id) {
            for p in players {
                self.members.remove(&p);
            }
        }
        self.by_name.remove(&guild.name.to_lowercase());
        self.by_tag.remove(&guild.tag.to_lowercase());
        self.guilds.remove(&guild_id);
        Ok(guild)
    }

    /// Settings changes; `None` fields keep their current value. A tag
    /// change re-checks uniqueness.
    pub async fn update_settings(
        &self,
        guild_id: Uuid,
        description: Option<String>,
        announcement: Option<String>,
        public_join: Option<bool>,
        tag: Option<String>,
    ) -> EngineResult<Guild> {
        let mut guild = self
            .guild(guild_id)
            .ok_or(EngineError::NotFound("guild"))?;
        let old_tag = guild.tag.clone();

        if let Some(d) = description {
            guild.description = d;
        }
        if let Some(a) = announcement {
            guild.announcement = a;
        }
        if let Some(p) = public_join {
            guild.public_join = p;
        }
        if let Some(t) = tag {
            let t = t.trim().to_string();
            if t.is_empty() {
                return Err(EngineError::InvalidState("tag is required"));
            }
            let taken = self
                .by_tag
                .get(&t.to_lowercase())
                .map(|id| *id != guild_id)
                .unwrap_or(false);
            if taken {
                return Err(EngineError::Conflict("guild tag already taken"));
            }
            guild.tag = t;
        }

        self.gateway.update_guild(&guild).await?;

        if guild.tag != old_tag {
            self.by_tag.remove(&old_tag.to_lowercase());
            self.by_tag.insert(guild.tag.to_lowercase(), guild_id);
        }
        self.guilds.insert(guild_id, guild.clone());
        Ok(guild)
    }

    /// Adds experience and applies level-ups. Returns the updated guild
    /// and the number of levels gained.
    pub async fn grant_experience(&self, guild_id: Uuid, amount: i64) -> EngineResult<(Guild, i32)> {
        if amount < 0 {
            return Err(EngineError::InvalidState("experience grants are non-negative"));
        }
        let mut guild = self
            .guild(guild_id)
            .ok_or(EngineError::NotFound("guild"))?;

        guild.experience += amount;
        let mut gained = 0;
        while guild.experience >= Guild::required_exp(guild.level) {
            guild.experience -= Guild::required_exp(guild.level);
            guild.level += 1;
            gained += 1;
        }

        self.gateway.update_guild(&guild).await?;
        self.guilds.insert(guild_id, guild.clone());
        Ok((guild, gained))
    }

    //////////////////////////////////////////////////
    // Membership
    //////////////////////////////////////////////////

    pub async fn add_member(
        &self,
        guild_id: Uuid,
        player_id: Uuid,
        display_name: &str,
        role: GuildRole,
    ) -> EngineResult<GuildMember> {
        if !self.guilds.contains_key(&guild_id) {
            return Err(EngineError::NotFound("guild"));
        }
        if self.members.contains_key(&player_id) {
            return Err(EngineError::Conflict("player already belongs to a guild"));
        }
        if self.max_members > 0 && self.member_count(guild_id) >= self.max_members {
            return Err(EngineError::CapacityExceeded("guild roster is full"));
        }

        let member = GuildMember {
            id: Uuid::new_v4(),
            guild_id,
            player_id,
            display_name: display_name.to_string(),
            role,
            joined_at: self.clock.now(),
        };
        self.gateway.create_member(&member).await?;
        self.index_member(member.clone());
        Ok(member)
    }

    /// Voluntary leave. Owners must transfer or disband instead.
    pub async fn remove_member(&self, player_id: Uuid) -> EngineResult<GuildMember> {
        let member = self
            .member(player_id)
            .ok_or(EngineError::NotFound("membership"))?;
        if member.role == GuildRole::Owner {
            return Err(EngineError::InvalidState(
                "owner must transfer ownership or disband",
            ));
        }

        self.gateway.delete_member(member.id).await?;
        self.members.remove(&player_id);
        if let Some(mut r) = self.roster.get_mut(&member.guild_id) {
            r.remove(&player_id);
        }
        Ok(member)
    }

    /// Kick by an Admin+; the target must rank strictly below the actor.
    pub async fn kick_member(&self, actor_id: Uuid, target_id: Uuid) -> EngineResult<GuildMember> {
        if actor_id == target_id {
            return Err(EngineError::InvalidState("cannot kick yourself"));
        }
        let actor = self
            .member(actor_id)
            .ok_or(EngineError::NotFound("membership"))?;
        let target = self
            .member(target_id)
            .ok_or(EngineError::NotFound("membership"))?;
        if actor.guild_id != target.guild_id {
            return Err(EngineError::NotFound("membership"));
        }
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        if target.role >= actor.role {
            return Err(EngineError::PermissionDenied("cannot kick an equal or higher rank"));
        }

        self.gateway.delete_member(target.id).await?;
        self.members.remove(&target_id);
        if let Some(mut r) = self.roster.get_mut(&target.guild_id) {
            r.remove(&target_id);
        }
        Ok(target)
    }

    /// Promote one rank (Member -> Elder -> Admin). Only ranks strictly
    /// below the actor's can be granted; ownership moves via transfer.
    pub async fn promote(&self, actor_id: Uuid, target_id: Uuid) -> EngineResult<GuildMember> {
        let (actor, mut target) = self.same_guild_pair(actor_id, target_id)?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        let next = target
            .role
            .promoted()
            .ok_or(EngineError::InvalidState("already at highest grantable rank"))?;
        if next >= actor.role {
            return Err(EngineError::PermissionDenied("cannot promote to your own rank"));
        }

        target.role = next;
        self.gateway.update_member(&target).await?;
        self.members.insert(target.player_id, target.clone());
        Ok(target)
    }

    pub async fn demote(&self, actor_id: Uuid, target_id: Uuid) -> EngineResult<GuildMember> {
        let (actor, mut target) = self.same_guild_pair(actor_id, target_id)?;
        if !actor.role.at_least(GuildRole::Admin) {
            return Err(EngineError::PermissionDenied("admin rank required"));
        }
        if target.role >= actor.role {
            return Err(EngineError::PermissionDenied("cannot demote an equal or higher rank"));
        }
        let next = target
            .role
            .demoted()
            .ok_or(EngineError::InvalidState("already at lowest rank"))?;

        target.role = next;
        self.gateway.update_member(&target).await?;
        self.members.insert(target.player_id, target.clone());
        Ok(target)
    }

    /// Hands ownership to another member; the old owner drops to Admin so
    /// exactly one Owner exists at every instant the cache is readable.
    pub async fn transfer_ownership(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> EngineResult<GuildMember> {
        let (mut actor, mut target) = self.same_guild_pair(actor_id, target_id)?;
        if actor.role != GuildRole::Owner {
            return Err(EngineError::PermissionDenied("owner rank required"));
        }

        let mut guild = self
            .guild(actor.guild_id)
            .ok_or(EngineError::NotFound("guild"))?;

        target.role = GuildRole::Owner;
        actor.role = GuildRole::Admin;
        guild.owner_id = target.player_id;

        self.gateway.update_member(&target).await?;
        self.gateway.update_member(&actor).await?;
        self.gateway.update_guild(&guild).await?;

        self.members.insert(target.player_id, target.clone());
        self.members.insert(actor.player_id, actor);
        self.guilds.insert(guild.id, guild);
        Ok(target)
    }

    fn same_guild_pair(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> EngineResult<(GuildMember, GuildMember)> {
        if actor_id == target_id {
            return Err(EngineError::InvalidState("cannot target yourself"));
        }
        let actor = self
            .member(actor_id)
            .ok_or(EngineError::NotFound("membership"))?;
        let target = self
            .member(target_id)
            .ok_or(EngineError::NotFound("membership"))?;
        if actor.guild_id != target.guild_id {
            return Err(EngineError::NotFound("membership"));
        }
        Ok((actor, target))
    }
}
