mod admin;
mod auth;
mod middleware;
mod public;
mod resources;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    application::{error::ErrorReport, projects::ProjectService},
    cache::{CacheError, CacheService},
    config::AuthSettings,
};

pub use auth::Viewer;

#[derive(Clone)]
pub struct HttpState {
    pub cache: CacheService,
    pub projects: ProjectService,
    pub auth: Arc<AuthSettings>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/projects", get(public::list_projects))
        .route("/projects/{slug}", get(public::project_detail))
        .route("/healthz", get(public::healthz))
        .route(
            "/cache/admin",
            get(admin::cache_keys).post(admin::delete_cache_key),
        )
        .route(
            "/resources/cache/sqlite",
            post(resources::remote_cache_command),
        )
        .route("/resources/cache/{tier}/{*key}", get(resources::cache_entry))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::server_timing))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

fn health_response(result: Result<(), CacheError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::cache_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
