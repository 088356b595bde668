//! Guild activities (create / join / leave / cancel / list / info)

use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::ActivityKind;
use crate::engine::Engine;
use crate::http::fail;

//////////////////////////////////////////////////
// Requests
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct CreateReq {
    pub creator_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub max_participants: i32,
}

#[derive(Deserialize)]
pub struct ParticipantReq {
    pub player_id: Uuid,
    pub activity_id: Uuid,
}

#[derive(Deserialize)]
pub struct CancelReq {
    pub actor_id: Uuid,
    pub activity_id: Uuid,
    #[serde(default)]
    pub operator_override: bool,
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/activities/create
#[post("/activities/create")]
pub async fn create(info: web::Json<CreateReq>, engine: web::Data<Engine>) -> impl Responder {
    let Some(kind) = ActivityKind::parse(&info.kind) else {
        return HttpResponse::BadRequest().body("unknown activity kind");
    };
    match engine
        .activities
        .create(
            info.creator_id,
            &info.name,
            &info.description,
            kind,
            info.starts_at,
            info.ends_at,
            &info.location,
            info.max_participants,
        )
        .await
    {
        Ok(a) => HttpResponse::Ok().json(serde_json::json!({ "activity_id": a.id })),
        Err(e) => fail(e),
    }
}

/// POST /api/activities/join
#[post("/activities/join")]
pub async fn join(info: web::Json<ParticipantReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.activities.join(info.player_id, info.activity_id).await {
        Ok(_) => HttpResponse::Ok().body("joined"),
        Err(e) => fail(e),
    }
}

/// POST /api/activities/leave
#[post("/activities/leave")]
pub async fn leave(info: web::Json<ParticipantReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.activities.leave(info.player_id, info.activity_id).await {
        Ok(()) => HttpResponse::Ok().body("left"),
        Err(e) => fail(e),
    }
}

/// POST /api/activities/cancel
#[post("/activities/cancel")]
pub async fn cancel(info: web::Json<CancelReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .activities
        .cancel(info.actor_id, info.activity_id, info.operator_override)
        .await
    {
        Ok(_) => HttpResponse::Ok().body("cancelled"),
        Err(e) => fail(e),
    }
}

/// GET /api/activities/of/{guild_id} — statuses are clock-derived.
#[get("/activities/of/{guild_id}")]
pub async fn of_guild(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    HttpResponse::Ok().json(engine.activities.activities_of(path.into_inner()))
}

/// GET /api/activities/info/{activity_id}
#[get("/activities/info/{activity_id}")]
pub async fn get_info(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    let aid = path.into_inner();
    match engine.activities.activity(aid) {
        Some(a) => {
            let participants = engine.activities.participants_of(aid);
            HttpResponse::Ok().json(serde_json::json!({
                "activity": a,
                "participants": participants,
            }))
        }
        None => HttpResponse::NotFound().body("not found: activity"),
    }
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create)
        .service(join)
        .service(leave)
        .service(cancel)
        .service(of_guild)
        .service(get_info);
}
