//! Entry metadata endpoints
//!
//! Creating a file answers with a `Location` header pointing at the
//! upload endpoint; the entry stays Reserved until the bytes arrive.

use actix_web::{HttpResponse, delete, get, http::header, post, web};
use serde::Deserialize;

use depot_common::EntryType;
use depot_replication::EntryRequest;

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEntryBody {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub path: String,
    pub group: i64,
    #[serde(default = "default_permission")]
    pub permission: String,
    #[serde(default)]
    pub share: Option<String>,
    #[serde(default)]
    pub size: i64,
    /// Candidate replica node uids
    pub locations: Vec<String>,
}

fn default_permission() -> String {
    "644".to_string()
}

impl From<CreateEntryBody> for EntryRequest {
    fn from(body: CreateEntryBody) -> Self {
        Self {
            name: body.name,
            entry_type: body.entry_type,
            path: body.path,
            group: body.group,
            permission: body.permission,
            share: body.share,
            size: body.size,
            locations: body.locations,
        }
    }
}

#[post("/entry/{owner}")]
pub async fn create_entry(
    state: web::Data<AppState>,
    owner: web::Path<i64>,
    body: web::Json<CreateEntryBody>,
) -> Result<HttpResponse, ApiError> {
    let owner = owner.into_inner();
    let entry = state.entries().save(owner, body.into_inner().into()).await?;

    let mut response = HttpResponse::Created();
    if !entry.is_directory() {
        response.insert_header((
            header::LOCATION,
            format!("/upload/{}/{}", owner, entry.uuid),
        ));
    }
    Ok(response.json(entry))
}

#[get("/entry/{owner}/entry")]
pub async fn list_entries(
    state: web::Data<AppState>,
    owner: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let entries = state.entries().entries(owner.into_inner()).await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[get("/entry/{owner}/entry/{uuid}")]
pub async fn get_entry(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, uuid) = path.into_inner();
    let entry = state.entries().entry_by_uuid(owner, &uuid).await?;
    Ok(HttpResponse::Ok().json(entry))
}

#[delete("/entry/{owner}/entry/{uuid}")]
pub async fn delete_entry(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, uuid) = path.into_inner();
    state.entries().delete_by_uuid(owner, &uuid).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/entry/{owner}/path/{path:.*}")]
pub async fn get_entry_by_path(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, tail) = path.into_inner();
    let entry = state
        .entries()
        .entry_by_path(owner, &format!("/{}", tail))
        .await?;
    Ok(HttpResponse::Ok().json(entry))
}

#[delete("/entry/{owner}/path/{path:.*}")]
pub async fn delete_entry_by_path(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, tail) = path.into_inner();
    state
        .entries()
        .delete_by_path(owner, &format!("/{}", tail))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
