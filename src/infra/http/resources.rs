//! Cache resources for single-key inspection and peer replication.

use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header::AUTHORIZATION},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    application::error::AppError,
    cache::{CacheEntry, Tier},
};

use super::{
    HttpState,
    admin::Success,
    auth::{RequireAdmin, extract_token, token_matches},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CacheEntryResponse {
    cache_key: String,
    value: Option<CacheEntry>,
}

/// `cacheValue` absent (or `null`) deletes the key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RemoteCacheCommand {
    key: String,
    #[serde(default)]
    cache_value: Option<CacheEntry>,
}

pub(super) async fn cache_entry(
    _admin: RequireAdmin,
    State(state): State<HttpState>,
    Path((tier, cache_key)): Path<(String, String)>,
) -> Result<Json<CacheEntryResponse>, AppError> {
    let tier = Tier::from_str(&tier)?;
    let value = state.cache.get(tier, &cache_key).await?;
    Ok(Json(CacheEntryResponse { cache_key, value }))
}

pub(super) async fn remote_cache_command(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let presented = extract_token(headers.get(AUTHORIZATION));
    if !token_matches(state.auth.internal_command_token.as_ref(), presented) {
        warn!(
            target = "folio::http::resources",
            "unauthorized remote cache command, redirecting"
        );
        return Ok(Redirect::to(state.auth.decoy_redirect_url.as_str()).into_response());
    }

    let command: RemoteCacheCommand = serde_json::from_slice(&body)
        .map_err(|err| AppError::validation(format!("invalid cache command: {err}")))?;

    match command.cache_value {
        Some(entry) => {
            info!(
                target = "folio::http::resources",
                key = %command.key,
                "setting cache entry from remote"
            );
            state.cache.set(Tier::Sqlite, &command.key, entry).await?;
        }
        None => {
            info!(
                target = "folio::http::resources",
                key = %command.key,
                "deleting cache entry from remote"
            );
            state.cache.delete(Tier::Sqlite, &command.key).await?;
        }
    }
    Ok(Success::ok().into_response())
}
