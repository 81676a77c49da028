use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;

use wayfare_db::models::UserRow;
use wayfare_types::api::{Claims, UpdateProfileRequest, UserSummary};

use crate::auth::{AppState, hash_password};
use crate::error::ApiError;
use crate::{blocking, parse_uuid};

pub(crate) fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&row.id, "user id"),
        email: row.email.clone(),
        name: row.name.clone(),
        role: row.role.clone(),
        interests: serde_json::from_str(&row.interests).unwrap_or_default(),
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let user = blocking(move || state.db.get_user_by_id(&uid))
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(json!({ "user": user_summary(&user) })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".into()));
        }
    }
    if let Some(password) = &req.password {
        if password.len() < 8 {
            return Err(ApiError::BadRequest(
                "password must be at least 8 characters".into(),
            ));
        }
    }

    let interests_json = match &req.interests {
        Some(interests) => {
            Some(serde_json::to_string(interests).map_err(|e| ApiError::Internal(e.to_string()))?)
        }
        None => None,
    };

    let uid = claims.sub.to_string();
    let user = blocking(move || {
        let password_hash = match req.password {
            Some(p) => Some(hash_password(&p)?),
            None => None,
        };
        state.db.update_user(
            &uid,
            req.name.as_deref(),
            password_hash.as_deref(),
            interests_json.as_deref(),
        )?;
        state.db.get_user_by_id(&uid)
    })
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(json!({ "user": user_summary(&user) })))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(move || state.db.list_users()).await?;
    let users: Vec<UserSummary> = rows.iter().map(user_summary).collect();

    Ok(Json(json!({ "users": users })))
}
