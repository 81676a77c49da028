pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod trips;
pub mod users;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

use middleware::{optional_auth, require_auth};

/// Full API surface. CORS and trace layers are added by the server binary.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .with_state(state.clone());

    // Browse routes are public but personalize when a valid token is sent.
    let browse = Router::new()
        .route("/api/trips", get(trips::list_trips))
        .route("/api/trips/{id}", get(trips::get_trip))
        .layer(from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/api/trips", post(trips::create_trip))
        .route("/api/trips/sweep", post(trips::sweep_trips))
        .route(
            "/api/trips/{id}",
            axum::routing::put(trips::update_trip).delete(trips::delete_trip),
        )
        .route("/api/trips/{id}/join", post(trips::join_trip))
        .route("/api/trips/{id}/leave", delete(trips::leave_trip))
        .route(
            "/api/messages/trips/{trip_id}",
            get(messages::get_trip_messages).post(messages::send_trip_message),
        )
        .route("/api/messages/conversations", get(messages::get_conversations))
        .route(
            "/api/messages/private/{user_id}",
            get(messages::get_private_messages)
                .post(messages::send_private_message)
                .delete(messages::delete_conversation),
        )
        .route("/api/messages/{message_id}", delete(messages::delete_message))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/users", get(users::list_users))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public).merge(browse).merge(protected)
}

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("background task failed".into())
        })?
        .map_err(ApiError::from)
}

/// Parse a stored timestamp, tolerating SQLite's bare "YYYY-MM-DD HH:MM:SS"
/// format for rows that predate explicit RFC 3339 inserts.
pub(crate) fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

pub(crate) fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' on {}: {}", raw, context, e);
        Uuid::default()
    })
}
