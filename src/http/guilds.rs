//! Guild management (create / disband / join / leave / roster ops / info)

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{GuildMember, GuildRole};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::http::fail;

//////////////////////////////////////////////////
// Data transfer objects
//////////////////////////////////////////////////

#[derive(Serialize)]
pub struct GuildRow {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub level: i32,
    pub member_count: usize,
    pub public_join: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
pub struct MemberRow {
    pub player_id: Uuid,
    pub display_name: String,
    pub role: GuildRole,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl From<GuildMember> for MemberRow {
    fn from(m: GuildMember) -> Self {
        MemberRow {
            player_id: m.player_id,
            display_name: m.display_name,
            role: m.role,
            joined_at: m.joined_at,
        }
    }
}

#[derive(Serialize)]
pub struct GuildInfo {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub description: String,
    pub announcement: String,
    pub owner_id: Uuid,
    pub level: i32,
    pub experience: i64,
    pub public_join: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub members: Vec<MemberRow>,
}

//////////////////////////////////////////////////
// Requests
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct CreateReq {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub description: String,
    pub founder_id: Uuid,
    pub founder_name: String,
    #[serde(default)]
    pub public_join: bool,
}

#[derive(Deserialize)]
pub struct DisbandReq {
    pub actor_id: Uuid,
    pub guild_id: Uuid,
}

#[derive(Deserialize)]
pub struct SettingsReq {
    pub actor_id: Uuid,
    pub guild_id: Uuid,
    pub description: Option<String>,
    pub announcement: Option<String>,
    pub public_join: Option<bool>,
    pub tag: Option<String>,
}

#[derive(Deserialize)]
pub struct JoinReq {
    pub guild_id: Uuid,
    pub player_id: Uuid,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct LeaveReq {
    pub player_id: Uuid,
}

#[derive(Deserialize)]
pub struct RosterReq {
    pub actor_id: Uuid,
    pub target_id: Uuid,
}

#[derive(Deserialize)]
pub struct ExpReq {
    pub guild_id: Uuid,
    pub amount: i64,
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/guilds/create
#[post("/guilds/create")]
pub async fn create(info: web::Json<CreateReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .cache
        .create_guild(
            &info.name,
            &info.tag,
            &info.description,
            info.founder_id,
            &info.founder_name,
            info.public_join,
        )
        .await
    {
        Ok(guild) => HttpResponse::Ok().json(serde_json::json!({ "guild_id": guild.id })),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/disband
#[post("/guilds/disband")]
pub async fn disband(info: web::Json<DisbandReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.disband_guild(info.actor_id, info.guild_id).await {
        Ok(_) => HttpResponse::Ok().body("disbanded"),
        Err(e) => fail(e),
    }
}

/// GET /api/guilds/list
#[get("/guilds/list")]
pub async fn list(engine: web::Data<Engine>) -> impl Responder {
    let mut rows: Vec<GuildRow> = engine
        .cache
        .all_guilds()
        .into_iter()
        .map(|g| GuildRow {
            member_count: engine.cache.member_count(g.id),
            id: g.id,
            name: g.name,
            tag: g.tag,
            level: g.level,
            public_join: g.public_join,
            created_at: g.created_at,
        })
        .collect();
    rows.sort_by_key(|r| r.created_at);
    HttpResponse::Ok().json(rows)
}

/// GET /api/guilds/info/{guild_id}
#[get("/guilds/info/{guild_id}")]
pub async fn get_info(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    let gid = path.into_inner();
    let Some(g) = engine.cache.guild(gid) else {
        return fail(EngineError::NotFound("guild"));
    };
    let mut members: Vec<MemberRow> = engine
        .cache
        .members_of(gid)
        .into_iter()
        .map(MemberRow::from)
        .collect();
    members.sort_by(|a, b| b.role.cmp(&a.role).then(a.display_name.cmp(&b.display_name)));

    HttpResponse::Ok().json(GuildInfo {
        id: g.id,
        name: g.name,
        tag: g.tag,
        description: g.description,
        announcement: g.announcement,
        owner_id: g.owner_id,
        level: g.level,
        experience: g.experience,
        public_join: g.public_join,
        created_at: g.created_at,
        members,
    })
}

/// GET /api/guilds/of/{player_id}
#[get("/guilds/of/{player_id}")]
pub async fn guild_of(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    match engine.cache.guild_of_player(path.into_inner()) {
        Some(g) => HttpResponse::Ok().json(serde_json::json!({
            "guild_id": g.id, "name": g.name, "tag": g.tag,
        })),
        None => HttpResponse::Ok().json(serde_json::json!(null)),
    }
}

/// POST /api/guilds/settings
#[post("/guilds/settings")]
pub async fn settings(info: web::Json<SettingsReq>, engine: web::Data<Engine>) -> impl Responder {
    // Settings changes are an officer decision.
    match engine.cache.member(info.actor_id) {
        Some(m) if m.guild_id == info.guild_id && m.role.at_least(GuildRole::Admin) => {}
        Some(_) | None => return fail(EngineError::PermissionDenied("admin rank required")),
    }
    let info = info.into_inner();
    match engine
        .cache
        .update_settings(
            info.guild_id,
            info.description,
            info.announcement,
            info.public_join,
            info.tag,
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().body("updated"),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/join — open-enrollment guilds only; closed guilds
/// go through invitations.
#[post("/guilds/join")]
pub async fn join(info: web::Json<JoinReq>, engine: web::Data<Engine>) -> impl Responder {
    let Some(guild) = engine.cache.guild(info.guild_id) else {
        return fail(EngineError::NotFound("guild"));
    };
    if !guild.public_join {
        return fail(EngineError::PermissionDenied("guild requires an invitation"));
    }
    match engine
        .cache
        .add_member(info.guild_id, info.player_id, &info.display_name, GuildRole::Member)
        .await
    {
        Ok(_) => HttpResponse::Ok().body("joined"),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/leave
#[post("/guilds/leave")]
pub async fn leave(info: web::Json<LeaveReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.cache.remove_member(info.player_id).await {
        Ok(_) => HttpResponse::Ok().body("left"),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/kick
#[post("/guilds/kick")]
pub async fn kick(info: web::Json<RosterReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.cache.kick_member(info.actor_id, info.target_id).await {
        Ok(_) => HttpResponse::Ok().body("kicked"),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/promote
#[post("/guilds/promote")]
pub async fn promote(info: web::Json<RosterReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.cache.promote(info.actor_id, info.target_id).await {
        Ok(m) => HttpResponse::Ok().json(serde_json::json!({ "role": m.role })),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/demote
#[post("/guilds/demote")]
pub async fn demote(info: web::Json<RosterReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.cache.demote(info.actor_id, info.target_id).await {
        Ok(m) => HttpResponse::Ok().json(serde_json::json!({ "role": m.role })),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/transfer
#[post("/guilds/transfer")]
pub async fn transfer(info: web::Json<RosterReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .cache
        .transfer_ownership(info.actor_id, info.target_id)
        .await
    {
        Ok(m) => HttpResponse::Ok().json(serde_json::json!({ "owner_id": m.player_id })),
        Err(e) => fail(e),
    }
}

/// POST /api/guilds/exp/grant — operator hook for quest/territory
/// rewards.
#[post("/guilds/exp/grant")]
pub async fn grant_exp(info: web::Json<ExpReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.grant_experience(info.guild_id, info.amount).await {
        Ok(g) => HttpResponse::Ok().json(serde_json::json!({
            "level": g.level, "experience": g.experience,
        })),
        Err(e) => fail(e),
    }
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create)
        .service(disband)
        .service(list)
        .service(get_info)
        .service(guild_of)
        .service(settings)
        .service(join)
        .service(leave)
        .service(kick)
        .service(promote)
        .service(demote)
        .service(transfer)
        .service(grant_exp);
}
