//! User and group endpoints
//!
//! Account writes mutate shared metadata the same way entry writes do,
//! so they are leader-only as well.

use actix_web::{HttpResponse, get, post, web};
use serde::Deserialize;

use depot_common::DepotError;

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<i64>,
}

fn require_leader(state: &AppState) -> Result<(), ApiError> {
    if state.is_leader() {
        Ok(())
    } else {
        Err(DepotError::Conflict(
            "account writes are accepted by the zone leader only".to_string(),
        )
        .into())
    }
}

#[post("/group")]
pub async fn create_group(
    state: web::Data<AppState>,
    body: web::Json<CreateGroupBody>,
) -> Result<HttpResponse, ApiError> {
    require_leader(&state)?;
    let group = state.groups.create(&body.name).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/group/{id}")]
pub async fn get_group(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let group = state
        .groups
        .find_by_id(id)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("group {}", id)))?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/user")]
pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<CreateUserBody>,
) -> Result<HttpResponse, ApiError> {
    require_leader(&state)?;
    let body = body.into_inner();
    let user = state.users.create(&body.username, body.groups).await?;
    Ok(HttpResponse::Created().json(user))
}

#[get("/user/{id}")]
pub async fn get_user(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("user {}", id)))?;
    Ok(HttpResponse::Ok().json(user))
}
