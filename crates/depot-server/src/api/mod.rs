//! HTTP surface
//!
//! Handlers stay thin: decode the request, call the service picked for
//! the node's current role, map the domain error to a status code.
//! Content reads are answered with a redirect to a live replica, never
//! by proxying bytes.

pub mod account;
pub mod entry;
pub mod file;
pub mod node;

use actix_web::{HttpResponse, ResponseError, http::StatusCode, web};

use depot_common::DepotError;

/// Boundary wrapper turning a [`DepotError`] into a JSON error response
#[derive(Debug)]
pub struct ApiError(DepotError);

impl From<DepotError> for ApiError {
    fn from(value: DepotError) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.0.to_string() }))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(entry::create_entry)
        .service(entry::list_entries)
        .service(entry::get_entry)
        .service(entry::delete_entry)
        .service(entry::get_entry_by_path)
        .service(entry::delete_entry_by_path)
        .service(file::upload_content)
        .service(file::serve_content)
        .service(file::serve_data)
        .service(file::read_content)
        .service(node::local_nodes)
        .service(node::global_nodes)
        .service(node::current_node)
        .service(account::create_group)
        .service(account::get_group)
        .service(account::create_user)
        .service(account::get_user);
}
