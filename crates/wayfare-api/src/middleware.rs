use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use wayfare_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Identity attached by `optional_auth`: present and verified, or absent.
#[derive(Debug, Clone)]
pub struct OptionalClaims(pub Option<Claims>);

fn bearer_claims(req: &Request, secret: &str) -> Option<Claims> {
    let auth_header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Extract and validate the JWT from the Authorization header. Rejects the
/// request with 401 before any handler logic runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = bearer_claims(&req, &state.jwt_secret).ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like `require_auth` but never rejects: used on public browse routes so a
/// valid token opportunistically personalizes results.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = bearer_claims(&req, &state.jwt_secret);
    req.extensions_mut().insert(OptionalClaims(claims));
    next.run(req).await
}
