//! Membership endpoints

use actix_web::{HttpResponse, get, web};

use crate::api::ApiError;
use crate::state::AppState;

/// Live members of this zone
#[get("/node/local")]
pub async fn local_nodes(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let nodes = state.registry.local_nodes().await?;
    Ok(HttpResponse::Ok().json(nodes))
}

/// Cross-zone directory, falling back to the local zone while empty
#[get("/node/global")]
pub async fn global_nodes(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let nodes = state.registry.global_nodes().await?;
    Ok(HttpResponse::Ok().json(nodes))
}

#[get("/node/current")]
pub async fn current_node(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.worker.current_identity().await)
}
