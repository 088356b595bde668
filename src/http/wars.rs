//! War lifecycle (declare / accept / ceasefire / status)

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::Engine;
use crate::http::fail;

//////////////////////////////////////////////////
// Requests
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct DeclareReq {
    pub actor_id: Uuid,
    pub target_guild_id: Uuid,
}

#[derive(Deserialize)]
pub struct AcceptReq {
    pub actor_id: Uuid,
    pub challenger_guild_id: Uuid,
}

#[derive(Deserialize)]
pub struct CeasefireReq {
    pub actor_id: Uuid,
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/wars/declare
#[post("/wars/declare")]
pub async fn declare(info: web::Json<DeclareReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .wars
        .invite_to_war(info.actor_id, info.target_guild_id)
        .await
    {
        Ok(invite) => HttpResponse::Ok().json(serde_json::json!({
            "challenger_id": invite.challenger_id,
            "target_id": invite.target_id,
            "expires_at": invite.expires_at,
        })),
        Err(e) => fail(e),
    }
}

/// POST /api/wars/accept
#[post("/wars/accept")]
pub async fn accept(info: web::Json<AcceptReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .wars
        .accept_war_invitation(info.actor_id, info.challenger_guild_id)
        .await
    {
        Ok(war) => HttpResponse::Ok().json(war),
        Err(e) => fail(e),
    }
}

/// GET /api/wars/of/{guild_id}
#[get("/wars/of/{guild_id}")]
pub async fn of_guild(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    match engine.wars.active_war_of(path.into_inner()) {
        Some(war) => HttpResponse::Ok().json(war),
        None => HttpResponse::Ok().json(serde_json::json!(null)),
    }
}

/// POST /api/wars/ceasefire/request
#[post("/wars/ceasefire/request")]
pub async fn ceasefire_request(
    info: web::Json<CeasefireReq>,
    engine: web::Data<Engine>,
) -> impl Responder {
    match engine.wars.request_ceasefire(info.actor_id).await {
        Ok(r) => HttpResponse::Ok().json(serde_json::json!({ "request_id": r.id })),
        Err(e) => fail(e),
    }
}

/// POST /api/wars/ceasefire/accept
#[post("/wars/ceasefire/accept")]
pub async fn ceasefire_accept(
    info: web::Json<CeasefireReq>,
    engine: web::Data<Engine>,
) -> impl Responder {
    match engine.wars.accept_ceasefire(info.actor_id).await {
        Ok(war) => HttpResponse::Ok().json(war),
        Err(e) => fail(e),
    }
}

/// POST /api/wars/ceasefire/reject
#[post("/wars/ceasefire/reject")]
pub async fn ceasefire_reject(
    info: web::Json<CeasefireReq>,
    engine: web::Data<Engine>,
) -> impl Responder {
    match engine.wars.reject_ceasefire(info.actor_id).await {
        Ok(()) => HttpResponse::Ok().body("rejected"),
        Err(e) => fail(e),
    }
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(declare)
        .service(accept)
        .service(of_guild)
        .service(ceasefire_request)
        .service(ceasefire_accept)
        .service(ceasefire_reject);
}
