//! Durable-store boundary. The engine only ever talks to this trait; the
//! cache owns every read/write path to an entity family, so no component
//! behind it touches the store directly.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::*;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    // ---- guilds -------------------------------------------------------
    async fn create_guild(&self, guild: &Guild) -> GatewayResult<()>;
    async fn update_guild(&self, guild: &Guild) -> GatewayResult<()>;
    async fn delete_guild(&self, id: Uuid) -> GatewayResult<()>;
    async fn guild_by_id(&self, id: Uuid) -> GatewayResult<Option<Guild>>;
    async fn guild_by_name(&self, name: &str) -> GatewayResult<Option<Guild>>;
    async fn guild_by_tag(&self, tag: &str) -> GatewayResult<Option<Guild>>;
    async fn all_guilds(&self) -> GatewayResult<Vec<Guild>>;

    // ---- members ------------------------------------------------------
    async fn create_member(&self, member: &GuildMember) -> GatewayResult<()>;
    async fn update_member(&self, member: &GuildMember) -> GatewayResult<()>;
    async fn delete_member(&self, id: Uuid) -> GatewayResult<()>;
    async fn delete_members_of_guild(&self, guild_id: Uuid) -> GatewayResult<()>;
    async fn all_members(&self) -> GatewayResult<Vec<GuildMember>>;

    // ---- alliances ----------------------------------------------------
    async fn create_alliance(&self, alliance: &Alliance) -> GatewayResult<()>;
    async fn delete_alliance(&self, a: Uuid, b: Uuid) -> GatewayResult<()>;
    async fn all_alliances(&self) -> GatewayResult<Vec<Alliance>>;

    // ---- alliance requests -------------------------------------------
    async fn create_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()>;
    async fn update_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()>;
    /// Drops settled (non-pending) request history between the pair, both
    /// directions, so a fresh request can be issued.
    async fn delete_settled_requests_between(&self, a: Uuid, b: Uuid) -> GatewayResult<()>;
    async fn delete_requests_with_guild(&self, guild_id: Uuid) -> GatewayResult<()>;
    async fn pending_alliance_requests(&self) -> GatewayResult<Vec<AllianceRequest>>;

    // ---- wars ---------------------------------------------------------
    async fn create_war(&self, war: &GuildWar) -> GatewayResult<()>;
    async fn update_war(&self, war: &GuildWar) -> GatewayResult<()>;
    async fn unfinished_wars(&self) -> GatewayResult<Vec<GuildWar>>;

    // ---- ceasefire requests ------------------------------------------
    async fn create_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()>;
    async fn update_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()>;
    async fn pending_ceasefires(&self) -> GatewayResult<Vec<CeasefireRequest>>;

    // ---- activities ---------------------------------------------------
    async fn create_activity(&self, activity: &GuildActivity) -> GatewayResult<()>;
    async fn update_activity(&self, activity: &GuildActivity) -> GatewayResult<()>;
    async fn delete_activities_of_guild(&self, guild_id: Uuid) -> GatewayResult<()>;
    async fn all_activities(&self) -> GatewayResult<Vec<GuildActivity>>;

    // ---- activity participants ---------------------------------------
    async fn create_participant(&self, participant: &ActivityParticipant) -> GatewayResult<()>;
    async fn delete_participant(&self, id: Uuid) -> GatewayResult<()>;
    async fn all_participants(&self) -> GatewayResult<Vec<ActivityParticipant>>;
}
