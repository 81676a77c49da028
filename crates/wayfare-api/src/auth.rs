use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use wayfare_db::Database;
use wayfare_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::blocking;
use crate::error::ApiError;
use crate::users::user_summary;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| e.contains('@'))
        .ok_or_else(|| ApiError::BadRequest("a valid email is required".into()))?
        .to_lowercase();
    let password = req
        .password
        .filter(|p| p.len() >= 8)
        .ok_or_else(|| ApiError::BadRequest("password must be at least 8 characters".into()))?;
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("name is required".into()))?;
    let interests_json = serde_json::to_string(&req.interests)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let user_id = Uuid::new_v4();
    let st = state.clone();
    let lookup_email = email.clone();

    let created = blocking(move || {
        let password_hash = hash_password(&password)?;
        if !st.db.create_user(
            &user_id.to_string(),
            &lookup_email,
            &name,
            &password_hash,
            &interests_json,
        )? {
            return Ok(None);
        }
        st.db.get_user_by_id(&user_id.to_string())
    })
    .await?;

    let user = created.ok_or_else(|| ApiError::BadRequest("email already exists".into()))?;
    let token = create_token(&state.jwt_secret, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user_summary(&user),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .ok_or_else(|| ApiError::BadRequest("email is required".into()))?;
    let password = req
        .password
        .ok_or_else(|| ApiError::BadRequest("password is required".into()))?;

    let st = state.clone();
    let user = blocking(move || {
        let Some(user) = st.db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        if verify_password(&password, &user.password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    })
    .await?
    .ok_or(ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse {
        user: user_summary(&user),
        token,
    }))
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn create_token(secret: &str, user: &wayfare_db::models::UserRow) -> Result<String, ApiError> {
    let sub: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::Internal(format!("corrupt user id '{}'", user.id)))?;

    let claims = Claims {
        sub,
        email: user.email.clone(),
        role: user.role.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.to_string()))
}
