//! Alliance diplomacy (request / accept / reject / break / list)

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::AllianceRequest;
use crate::engine::Engine;
use crate::http::fail;

//////////////////////////////////////////////////
// DTOs
//////////////////////////////////////////////////

#[derive(Serialize)]
pub struct RequestRow {
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

impl From<AllianceRequest> for RequestRow {
    fn from(r: AllianceRequest) -> Self {
        RequestRow {
            requester_id: r.requester_id,
            target_id: r.target_id,
            requested_at: r.requested_at,
        }
    }
}

#[derive(Deserialize)]
pub struct SendReq {
    pub requester_id: Uuid,
    pub target_id: Uuid,
}

#[derive(Deserialize)]
pub struct AnswerReq {
    pub target_id: Uuid,
    pub requester_id: Uuid,
}

#[derive(Deserialize)]
pub struct BreakReq {
    pub actor_id: Uuid,
    pub guild_a: Uuid,
    pub guild_b: Uuid,
}

#[derive(Deserialize)]
pub struct DirectReq {
    pub guild_a: Uuid,
    pub guild_b: Uuid,
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/alliances/request
#[post("/alliances/request")]
pub async fn request(info: web::Json<SendReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .alliances
        .send_request(info.requester_id, info.target_id)
        .await
    {
        Ok(r) => HttpResponse::Ok().json(serde_json::json!({ "request_id": r.id })),
        Err(e) => fail(e),
    }
}

/// POST /api/alliances/accept
#[post("/alliances/accept")]
pub async fn accept(info: web::Json<AnswerReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .alliances
        .accept(info.target_id, info.requester_id)
        .await
    {
        Ok(a) => HttpResponse::Ok().json(serde_json::json!({ "a": a.a, "b": a.b })),
        Err(e) => fail(e),
    }
}

/// POST /api/alliances/reject
#[post("/alliances/reject")]
pub async fn reject(info: web::Json<AnswerReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .alliances
        .reject(info.target_id, info.requester_id)
        .await
    {
        Ok(()) => HttpResponse::Ok().body("rejected"),
        Err(e) => fail(e),
    }
}

/// POST /api/alliances/break
#[post("/alliances/break")]
pub async fn break_alliance(info: web::Json<BreakReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine
        .alliances
        .break_alliance(info.actor_id, info.guild_a, info.guild_b)
        .await
    {
        Ok(()) => HttpResponse::Ok().body("broken"),
        Err(e) => fail(e),
    }
}

/// POST /api/alliances/direct — operator-forced alliance.
#[post("/alliances/direct")]
pub async fn direct(info: web::Json<DirectReq>, engine: web::Data<Engine>) -> impl Responder {
    match engine.alliances.create_direct(info.guild_a, info.guild_b).await {
        Ok(a) => HttpResponse::Ok().json(serde_json::json!({ "a": a.a, "b": a.b })),
        Err(e) => fail(e),
    }
}

/// GET /api/alliances/of/{guild_id}
#[get("/alliances/of/{guild_id}")]
pub async fn of_guild(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    HttpResponse::Ok().json(engine.alliances.alliances_of(path.into_inner()))
}

/// GET /api/alliances/requests/{guild_id}
#[get("/alliances/requests/{guild_id}")]
pub async fn requests(path: web::Path<Uuid>, engine: web::Data<Engine>) -> impl Responder {
    let gid = path.into_inner();
    let sent: Vec<RequestRow> = engine
        .alliances
        .requests_sent_by(gid)
        .into_iter()
        .map(RequestRow::from)
        .collect();
    let received: Vec<RequestRow> = engine
        .alliances
        .requests_received_by(gid)
        .into_iter()
        .map(RequestRow::from)
        .collect();
    HttpResponse::Ok().json(serde_json::json!({ "sent": sent, "received": received }))
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(request)
        .service(accept)
        .service(reject)
        .service(break_alliance)
        .service(direct)
        .service(of_guild)
        .service(requests);
}
