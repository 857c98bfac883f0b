use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::jwt::decode_jwt;
use crate::AppState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Identity-provider user id.
    pub sub: String,
    pub email: String,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Extracts the calling user from a bearer token. `None` means the request is
/// anonymous; handlers decide whether that is an error or a zeroed response.
pub fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<Claims> {
    let token = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;

    match decode_jwt(
        token,
        &state.jwt_keys,
        &state.config.jwt_issuer,
        &state.config.jwt_audience,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            None
        }
    }
}
