//! Bearer-token roles.
//!
//! Two independent credentials exist: the admin token, which unlocks the
//! cache inspection routes and the `fresh` query parameter, and the internal
//! command token used by peer instances to push cache writes.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
};
use subtle::ConstantTimeEq;

use crate::{application::error::HttpError, config::Secret, domain::users::Role};

use super::HttpState;

pub(super) fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
}

/// An unset credential matches nothing.
pub(super) fn token_matches(expected: Option<&Secret>, presented: Option<&str>) -> bool {
    match (expected, presented) {
        (Some(expected), Some(presented)) => {
            bool::from(expected.expose().as_bytes().ct_eq(presented.as_bytes()))
        }
        _ => false,
    }
}

/// The caller's role; anonymous unless a valid admin token is presented.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub role: Role,
}

impl FromRequestParts<HttpState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let presented = extract_token(parts.headers.get(AUTHORIZATION));
        let role = if token_matches(state.auth.admin_token.as_ref(), presented) {
            Role::Admin
        } else {
            Role::Anonymous
        };
        Ok(Viewer { role })
    }
}

/// Only admins get past this extractor; everyone else sees a plain 404.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<HttpState> for RequireAdmin {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(viewer) = Viewer::from_request_parts(parts, state).await;
        if viewer.role.is_admin() {
            Ok(RequireAdmin)
        } else {
            Err(HttpError::new(
                "infra::http::auth::require_admin",
                StatusCode::NOT_FOUND,
                "Not Found",
                format!("admin role required for {}", parts.uri.path()),
            ))
        }
    }
}
