//! `X-API-KEY` credential check.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Extractor that only succeeds for requests carrying an accepted API key.
#[derive(Debug, Clone)]
pub struct ApiKey(pub String);

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing X-API-KEY header".into()))?;

        if !is_accepted(&state.api_keys, key) {
            tracing::debug!("Rejected request with unknown API key");
            return Err(AppError::Unauthorized("invalid API key".into()));
        }

        Ok(ApiKey(key.to_string()))
    }
}

fn is_accepted(accepted: &[String], key: &str) -> bool {
    accepted.is_empty() || accepted.iter().any(|k| k == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_list_accepts_any_key() {
        assert!(is_accepted(&[], "anything"));
    }

    #[test]
    fn configured_keys_are_exact() {
        let keys = vec!["alpha".to_string(), "beta".to_string()];
        assert!(is_accepted(&keys, "beta"));
        assert!(!is_accepted(&keys, "gamma"));
        assert!(!is_accepted(&keys, "alph"));
    }
}
