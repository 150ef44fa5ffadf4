use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::{
    application::error::AppError,
    cache::{FreshnessContext, Timings},
    domain::projects::Project,
};

use super::{HttpState, auth::Viewer, health_response};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct FreshQuery {
    fresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProjectsResponse {
    projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProjectResponse {
    project: Project,
}

pub(super) async fn list_projects(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<FreshQuery>,
    Extension(timings): Extension<Timings>,
) -> Result<Json<ProjectsResponse>, AppError> {
    let context = FreshnessContext::new(viewer.role, query.fresh);
    let projects = state
        .projects
        .projects(Some(&context), Some(&timings))
        .await?;
    Ok(Json(ProjectsResponse { projects }))
}

pub(super) async fn project_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(query): Query<FreshQuery>,
    Extension(timings): Extension<Timings>,
) -> Result<Json<ProjectResponse>, AppError> {
    let context = FreshnessContext::new(viewer.role, query.fresh);
    let project = state
        .projects
        .project_by_slug(&slug, Some(&context), Some(&timings))
        .await?;
    Ok(Json(ProjectResponse { project }))
}

pub(super) async fn healthz(State(state): State<HttpState>) -> Response {
    health_response(state.cache.health_check().await)
}
