//! Guild-join invitations (send / accept / reject)

use actix_web::{post, web, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::Engine;
use crate::http::fail;

//////////////////////////////////////////////////
// Requests
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct SendReq {
    pub inviter_id: Uuid,
    pub target_player_id: Uuid,
}

#[derive(Deserialize)]
pub struct AcceptReq {
    pub player_id: Uuid,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct RejectReq {
    pub player_id: Uuid,
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/invites/send
#[post("/invites/send")]
pub async fn send(info: web::Json<SendReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .invites
        .invite(info.inviter_id, info.target_player_id)
        .await
    {
        Ok(i) => HttpResponse::Ok().json(serde_json::json!({ "guild_id": i.guild_id })),
        Err(e) => fail(e),
    }
}

/// POST /api/invites/accept
#[post("/invites/accept")]
pub async fn accept(info: web::Json<AcceptReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.invites.accept(info.player_id, &info.display_name).await {
        Ok(m) => HttpResponse::Ok().json(serde_json::json!({ "guild_id": m.guild_id })),
        Err(e) => fail(e),
    }
}

/// POST /api/invites/reject
#[post("/invites/reject")]
pub async fn reject(info: web::Json<RejectReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.invites.reject(info.player_id).await {
        Ok(()) => HttpResponse::Ok().body("rejected"),
        Err(e) => fail(e),
    }
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(send).service(accept).service(reject);
}
