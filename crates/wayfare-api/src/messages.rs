use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use wayfare_db::models::{MessageRow, UserRow};
use wayfare_types::api::{
    Claims, ConversationResponse, MessageResponse, SendMessageRequest, UserSummary,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::users::user_summary;
use crate::{blocking, parse_timestamp, parse_uuid};

fn required_content(req: SendMessageRequest) -> Result<String, ApiError> {
    req.content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("content must not be empty".into()))
}

fn sender_summary(row: &MessageRow) -> Option<UserSummary> {
    Some(UserSummary {
        id: parse_uuid(&row.sender_id, "message sender_id"),
        email: row.sender_email.clone()?,
        name: row.sender_name.clone()?,
        role: row.sender_role.clone()?,
        interests: row
            .sender_interests
            .as_deref()
            .and_then(|i| serde_json::from_str(i).ok())
            .unwrap_or_default(),
    })
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    let sender = sender_summary(&row);
    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        content: row.content,
        sender_id: parse_uuid(&row.sender_id, "message sender_id"),
        trip_id: row.trip_id.as_deref().map(|t| parse_uuid(t, "message trip_id")),
        recipient_id: row
            .recipient_id
            .as_deref()
            .map(|r| parse_uuid(r, "message recipient_id")),
        sender,
        created_at: parse_timestamp(&row.created_at, "message created_at"),
    }
}

/// Reduce a newest-first private message list to one entry per counterpart.
/// Descending input order makes first-seen equivalent to most-recent.
fn reduce_conversations(user_id: &str, rows: Vec<MessageRow>) -> Vec<(String, MessageRow)> {
    let mut seen = HashSet::new();
    let mut latest = Vec::new();

    for row in rows {
        let counterpart = if row.sender_id == user_id {
            row.recipient_id
                .clone()
                .unwrap_or_else(|| row.sender_id.clone())
        } else {
            row.sender_id.clone()
        };

        if seen.insert(counterpart.clone()) {
            latest.push((counterpart, row));
        }
    }

    latest
}

// -- Group path: gated on current trip membership, re-checked per request --

pub async fn get_trip_messages(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = trip_id.to_string();
    let uid = claims.sub.to_string();

    let rows = blocking(move || {
        if !state.db.is_participant(&tid, &uid)? {
            return Ok(None);
        }
        state.db.get_trip_messages(&tid).map(Some)
    })
    .await?
    .ok_or(ApiError::Forbidden)?;

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();
    Ok(Json(json!({ "messages": messages })))
}

pub async fn send_trip_message(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = required_content(req)?;
    let tid = trip_id.to_string();
    let uid = claims.sub.to_string();
    let mid = Uuid::new_v4().to_string();

    let row = blocking(move || {
        if !state.db.is_participant(&tid, &uid)? {
            return Ok(None);
        }
        state
            .db
            .insert_message(&mid, &content, &uid, Some(&tid), None)?;
        state.db.get_message(&mid)
    })
    .await?
    .ok_or(ApiError::Forbidden)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message_response(row) })),
    ))
}

// -- Private path --

pub async fn get_private_messages(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();
    let other = user_id.to_string();

    let rows = blocking(move || state.db.get_private_messages(&me, &other)).await?;
    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();

    Ok(Json(json!({ "messages": messages })))
}

pub async fn send_private_message(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = required_content(req)?;
    let me = claims.sub.to_string();
    let other = user_id.to_string();
    let mid = Uuid::new_v4().to_string();

    let row = blocking(move || {
        if state.db.get_user_by_id(&other)?.is_none() {
            return Ok(None);
        }
        state
            .db
            .insert_message(&mid, &content, &me, None, Some(&other))?;
        state.db.get_message(&mid)
    })
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message_response(row) })),
    ))
}

/// Derived projection over the caller's private messages: one entry per
/// counterpart, carrying the most recent message. Recomputed on every fetch,
/// never persisted.
pub async fn get_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();

    let st = state.clone();
    let lookup = me.clone();
    let rows = blocking(move || st.db.get_private_messages_for_user(&lookup)).await?;

    let latest = reduce_conversations(&me, rows);
    let counterpart_ids: Vec<String> = latest.iter().map(|(id, _)| id.clone()).collect();

    let counterparts = blocking(move || state.db.get_users_by_ids(&counterpart_ids)).await?;
    let by_id: HashMap<String, UserRow> = counterparts
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    let conversations: Vec<ConversationResponse> = latest
        .into_iter()
        .filter_map(|(counterpart_id, row)| {
            by_id.get(&counterpart_id).map(|user| ConversationResponse {
                user: user_summary(user),
                last_message: message_response(row),
            })
        })
        .collect();

    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();
    let other = user_id.to_string();

    let deleted = blocking(move || state.db.delete_conversation(&me, &other)).await?;

    Ok(Json(json!({ "deleted": deleted })))
}

/// Unsend: only the original sender may delete their message.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let mid = message_id.to_string();
    let uid = claims.sub.to_string();

    let st = state.clone();
    let lookup = mid.clone();
    let message = blocking(move || st.db.get_message(&lookup))
        .await?
        .ok_or(ApiError::NotFound("message"))?;

    if message.sender_id != uid {
        return Err(ApiError::Forbidden);
    }

    blocking(move || state.db.delete_message(&mid)).await?;

    Ok(Json(json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::reduce_conversations;
    use wayfare_db::models::MessageRow;

    fn row(id: &str, content: &str, sender: &str, recipient: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            content: content.into(),
            sender_id: sender.into(),
            trip_id: None,
            recipient_id: Some(recipient.into()),
            sender_email: None,
            sender_name: None,
            sender_role: None,
            sender_interests: None,
            created_at: "2026-08-01T10:00:00.000000+00:00".into(),
        }
    }

    #[test]
    fn keeps_first_seen_entry_per_counterpart() {
        // Newest first, as the query returns them: b replied last.
        let rows = vec![
            row("3", "reply", "b", "a"),
            row("2", "second", "a", "b"),
            row("1", "first", "a", "b"),
        ];

        let latest = reduce_conversations("a", rows);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].0, "b");
        assert_eq!(latest[0].1.content, "reply");
    }

    #[test]
    fn separates_counterparts() {
        let rows = vec![
            row("3", "to c", "a", "c"),
            row("2", "from b", "b", "a"),
            row("1", "to b", "a", "b"),
        ];

        let latest = reduce_conversations("a", rows);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].0, "c");
        assert_eq!(latest[1].0, "b");
        assert_eq!(latest[1].1.content, "from b");
    }
}
