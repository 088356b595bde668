//! HTTP command layer: thin actix handlers over the engine. Maps the
//! engine's failure taxonomy onto status codes; localized text is the
//! front-end's job.

pub mod activities;
pub mod alliances;
pub mod guilds;
pub mod health;
pub mod invites;
pub mod presence;
pub mod routes;
pub mod wars;

use actix_web::HttpResponse;

use crate::error::EngineError;

/// Taxonomy -> status line. The body carries the reason code text.
pub(crate) fn fail(e: EngineError) -> HttpResponse {
    let body = e.to_string();
    match e {
        EngineError::NotFound(_) => HttpResponse::NotFound().body(body),
        EngineError::InvalidState(_)
        | EngineError::Conflict(_)
        | EngineError::CapacityExceeded(_) => HttpResponse::Conflict().body(body),
        EngineError::PermissionDenied(_) => HttpResponse::Forbidden().body(body),
        EngineError::Persistence(_) => {
            log::error!("request failed on durable store: {body}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
