//! Administrative cache inspection.

use std::str::FromStr;

use axum::{
    Form, Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::error::AppError,
    cache::{CacheKeys, Tier},
};

use super::{HttpState, auth::RequireAdmin};

const DEFAULT_KEY_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CacheAdminQuery {
    query: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CacheKeysResponse {
    cache_keys: CacheKeys,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteCacheForm {
    #[serde(rename = "cacheKey")]
    cache_key: String,
    #[serde(rename = "type")]
    tier: String,
}

#[derive(Debug, Serialize)]
pub(super) struct Success {
    success: bool,
}

impl Success {
    pub(super) fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

pub(super) async fn cache_keys(
    _admin: RequireAdmin,
    State(state): State<HttpState>,
    Query(params): Query<CacheAdminQuery>,
) -> Result<Json<CacheKeysResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_KEY_LIMIT);
    let cache_keys = match params.query.as_deref() {
        Some(query) => state.cache.search_keys(query, limit).await?,
        None => state.cache.list_keys(limit).await?,
    };
    Ok(Json(CacheKeysResponse { cache_keys }))
}

pub(super) async fn delete_cache_key(
    _admin: RequireAdmin,
    State(state): State<HttpState>,
    Form(form): Form<DeleteCacheForm>,
) -> Result<Json<Success>, AppError> {
    let tier = Tier::from_str(&form.tier)?;
    state.cache.delete(tier, &form.cache_key).await?;
    Ok(Success::ok())
}
