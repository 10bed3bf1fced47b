use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::db::User;
use crate::error::ApiError;
use crate::routes::AppState;

const API_KEY_PREFIX: &str = "ApiKey ";

/// Pull the API key out of the `Authorization` header.
///
/// The `ApiKey ` prefix is stripped when present; a header without it is
/// taken as the key itself. Empty or non-UTF-8 values count as missing.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let key = value.strip_prefix(API_KEY_PREFIX).unwrap_or(value);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// A fresh 64-character hex API key.
pub fn generate_api_key() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    format!("{:x}", Sha256::digest(seed))
}

/// The user resolved from the request's API key.
///
/// Handlers taking this extractor only run once the key has been looked up.
///
/// A missing key and a key that matches no user are both rejected with 401
/// and a JSON error body; an unknown key is not reported as 404.
pub struct AuthedUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(&parts.headers).ok_or(ApiError::MissingApiKey)?;

        let user = state.db.get_user_by_api_key(api_key).await.map_err(|e| {
            warn!("API key lookup failed: {}", e);
            ApiError::InvalidApiKey(e.to_string())
        })?;

        Ok(AuthedUser(user))
    }
}
