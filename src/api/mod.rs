//! REST API layer: route handlers, DTOs, router composition and OpenAPI
//! document.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(handlers::user::get_user, handlers::system::health_handler),
    components(schemas(
        dto::UserResponse,
        crate::models::User,
        crate::error::ErrorBody,
        handlers::system::HealthResponse,
    )),
    tags(
        (name = "Users", description = "Demo user create/lookup"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    handlers::routes()
}
