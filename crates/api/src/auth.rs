//! Bearer-token authentication.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ApiErrorBody;
use crate::state::AppState;

/// Compares a presented token with the stored key hash in constant time.
pub(crate) fn token_matches(expected_hash: &[u8; 32], token: &str) -> bool {
    let provided = Sha256::digest(token.as_bytes());
    bool::from(expected_hash.ct_eq(provided.as_slice()))
}

fn reject(error: &str, message: &str) -> (StatusCode, Json<ApiErrorBody>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorBody {
            error: error.into(),
            message: message.into(),
        }),
    )
}

/// Requires `Authorization: Bearer <token>` when an API key is configured.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiErrorBody>)> {
    let Some(ref expected_hash) = state.api_key_hash else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if token_matches(expected_hash, token) => Ok(next.run(request).await),
            Some(_) => Err(reject("invalid_token", "Invalid API key")),
            None => Err(reject(
                "invalid_scheme",
                "Expected 'Bearer <token>' authorization",
            )),
        },
        None => Err(reject("missing_token", "Authorization header required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::hash_api_key;

    #[test]
    fn token_comparison() {
        let hash = hash_api_key("s3cret");
        assert!(token_matches(&hash, "s3cret"));
        assert!(!token_matches(&hash, "s3cret "));
        assert!(!token_matches(&hash, ""));
    }
}
