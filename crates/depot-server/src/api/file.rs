//! Content endpoints
//!
//! `POST /upload` is the client's second step after creating a file
//! entry and is accepted by the leader only. `GET /upload` serves the
//! raw bytes and is what replica pulls hit. `GET /file` never moves
//! bytes; it answers 303 with a live replica's content URL. Serving
//! streams from disk, so response memory stays bounded regardless of
//! content size.

use std::path::Path;

use actix_files::NamedFile;
use actix_web::{HttpResponse, get, http::header, post, web};

use depot_common::DepotError;

use crate::api::ApiError;
use crate::state::AppState;

async fn stream_file(path: &Path, missing: String) -> Result<NamedFile, ApiError> {
    match NamedFile::open_async(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DepotError::NotFound(missing).into())
        }
        Err(e) => Err(DepotError::from(e).into()),
    }
}

#[post("/upload/{owner}/{uuid}")]
pub async fn upload_content(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    if !state.is_leader() {
        return Err(DepotError::Conflict(
            "content uploads are accepted by the zone leader only".to_string(),
        )
        .into());
    }

    let (owner, uuid) = path.into_inner();
    let entry = state.master_files.save_content(owner, &uuid, &body).await?;
    Ok(HttpResponse::Ok().json(entry))
}

#[get("/upload/{owner}/{uuid}")]
pub async fn serve_content(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<NamedFile, ApiError> {
    let (owner, uuid) = path.into_inner();
    let content_path = state.store.content_path(owner, &uuid).await?;
    stream_file(&content_path, format!("content for entry {}", uuid)).await
}

/// Redirect target: raw content addressed by its physical path
#[get("/data/{path:.*}")]
pub async fn serve_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<NamedFile, ApiError> {
    let tail = path.into_inner();
    if tail.split('/').any(|segment| segment == "..") {
        return Err(DepotError::NotFound(format!("content at {}", tail)).into());
    }
    stream_file(&state.store.absolute_path(&tail), format!("content at {}", tail)).await
}

#[get("/file/{owner}/{uuid}")]
pub async fn read_content(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, uuid) = path.into_inner();
    let entry = state.entries().entry_by_uuid(owner, &uuid).await?;
    let url = state.router.redirect_url(&entry).await?;
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, url))
        .finish())
}
