use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use wayfare_db::models::{JoinOutcome, NewTrip, ParticipantRow, TripPatch, TripRow};
use wayfare_db::queries::{TripFilter, TripOrder};
use wayfare_types::api::{
    Claims, CreateTripRequest, JoinTripRequest, ParticipantResponse, TripDetailResponse,
    TripResponse, UpdateTripRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::OptionalClaims;
use crate::users::user_summary;
use crate::{blocking, parse_timestamp, parse_uuid};

const MIN_BUDGET: f64 = 100.0;
const DEFAULT_BUDGET: f64 = 1000.0;
const DEFAULT_MAX_PARTICIPANTS: u32 = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripKind {
    #[default]
    Recent,
    Popular,
    Recommended,
}

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub destination: Option<String>,
    pub category: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default, alias = "type")]
    pub kind: TripKind,
}

/// Budget floor rule carried over from the original API: anything below the
/// minimum (or absent) falls back to the default.
fn normalize_budget(requested: Option<f64>) -> f64 {
    match requested {
        Some(b) if b >= MIN_BUDGET => b,
        _ => DEFAULT_BUDGET,
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn authorize_owner(claims: &Claims, owner_id: &str) -> Result<(), ApiError> {
    if claims.role == "admin" || claims.sub.to_string() == owner_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub(crate) fn trip_response(row: TripRow) -> TripResponse {
    TripResponse {
        id: parse_uuid(&row.id, "trip id"),
        title: row.title,
        destination: row.destination,
        description: row.description,
        start_date: parse_timestamp(&row.start_date, "trip start_date"),
        end_date: row.end_date.as_deref().map(|d| parse_timestamp(d, "trip end_date")),
        budget: row.budget,
        max_participants: row.max_participants.max(0) as u32,
        category: row.category,
        image_url: row.image_url,
        creator_id: parse_uuid(&row.creator_id, "trip creator_id"),
        participant_count: row.participant_count.max(0) as u32,
        created_at: parse_timestamp(&row.created_at, "trip created_at"),
    }
}

fn participant_response(row: ParticipantRow) -> ParticipantResponse {
    ParticipantResponse {
        id: parse_uuid(&row.id, "participant id"),
        trip_id: parse_uuid(&row.trip_id, "participant trip_id"),
        user_id: parse_uuid(&row.user_id, "participant user_id"),
        name: row.name,
        interests: serde_json::from_str(&row.interests).unwrap_or_default(),
        joined_at: parse_timestamp(&row.joined_at, "participant joined_at"),
    }
}

pub async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
    Extension(OptionalClaims(claims)): Extension<OptionalClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let order = match query.kind {
        TripKind::Recent => TripOrder::Recent,
        TripKind::Popular => TripOrder::Popular,
        TripKind::Recommended => match &claims {
            Some(c) => {
                let uid = c.sub.to_string();
                let st = state.clone();
                let interests: Vec<String> = blocking(move || st.db.get_user_by_id(&uid))
                    .await?
                    .map(|u| serde_json::from_str(&u.interests).unwrap_or_default())
                    .unwrap_or_default();
                if interests.is_empty() {
                    TripOrder::Recent
                } else {
                    TripOrder::ByCategories(interests)
                }
            }
            // No identity attached: recommendations degrade to recency.
            None => TripOrder::Recent,
        },
    };

    let filter = TripFilter {
        destination: query.destination,
        category: query.category,
        from: query.from.map(fmt_dt),
        to: query.to.map(fmt_dt),
    };

    let rows = blocking(move || state.db.list_trips(&filter, &order)).await?;
    let trips: Vec<TripResponse> = rows.into_iter().map(trip_response).collect();

    Ok(Json(json!({ "trips": trips })))
}

pub async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = id.to_string();

    let found = blocking(move || {
        let Some(trip) = state.db.get_trip(&tid)? else {
            return Ok(None);
        };
        let participants = state.db.get_trip_participants(&tid)?;
        let creator = state.db.get_user_by_id(&trip.creator_id)?;
        Ok(Some((trip, participants, creator)))
    })
    .await?;

    let (trip, participants, creator) = found.ok_or(ApiError::NotFound("trip"))?;

    let detail = TripDetailResponse {
        trip: trip_response(trip),
        creator: creator.as_ref().map(user_summary),
        participants: participants.into_iter().map(participant_response).collect(),
    };

    Ok(Json(json!({ "trip": detail })))
}

pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = required_text(req.title, "title")?;
    let destination = required_text(req.destination, "destination")?;
    let start_date = req
        .start_date
        .ok_or_else(|| ApiError::BadRequest("startDate is required".into()))?;

    if let Some(end) = req.end_date {
        if end < start_date {
            return Err(ApiError::BadRequest(
                "endDate must not be before startDate".into(),
            ));
        }
    }

    let max_participants = req.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
    if max_participants == 0 {
        return Err(ApiError::BadRequest(
            "maxParticipants must be at least 1".into(),
        ));
    }

    let trip = NewTrip {
        id: Uuid::new_v4().to_string(),
        title,
        destination,
        description: req.description.unwrap_or_default(),
        start_date: fmt_dt(start_date),
        end_date: req.end_date.map(fmt_dt),
        budget: normalize_budget(req.budget),
        max_participants: i64::from(max_participants),
        category: req.category,
        image_url: req.image_url,
        // Never client-supplied: the creator is whoever holds the token.
        creator_id: claims.sub.to_string(),
    };
    let tid = trip.id.clone();

    let row = blocking(move || {
        state.db.insert_trip(&trip)?;
        state.db.get_trip(&tid)
    })
    .await?
    .ok_or(ApiError::NotFound("trip"))?;

    Ok((StatusCode::CREATED, Json(json!({ "trip": trip_response(row) }))))
}

pub async fn update_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTripRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = id.to_string();

    let st = state.clone();
    let lookup = tid.clone();
    let existing = blocking(move || st.db.get_trip(&lookup))
        .await?
        .ok_or(ApiError::NotFound("trip"))?;

    authorize_owner(&claims, &existing.creator_id)?;

    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }
    }
    if let Some(destination) = &req.destination {
        if destination.trim().is_empty() {
            return Err(ApiError::BadRequest("destination must not be empty".into()));
        }
    }
    if let Some(m) = req.max_participants {
        if m == 0 {
            return Err(ApiError::BadRequest(
                "maxParticipants must be at least 1".into(),
            ));
        }
    }

    // Validate date ordering against the values the trip will end up with.
    let effective_start = req
        .start_date
        .unwrap_or_else(|| parse_timestamp(&existing.start_date, "trip start_date"));
    let effective_end = match &req.end_date {
        Some(patch) => *patch,
        None => existing
            .end_date
            .as_deref()
            .map(|d| parse_timestamp(d, "trip end_date")),
    };
    if let Some(end) = effective_end {
        if end < effective_start {
            return Err(ApiError::BadRequest(
                "endDate must not be before startDate".into(),
            ));
        }
    }

    let patch = TripPatch {
        title: req.title,
        destination: req.destination,
        description: req.description,
        start_date: req.start_date.map(fmt_dt),
        end_date: req.end_date.map(|o| o.map(fmt_dt)),
        budget: req.budget.map(|b| normalize_budget(Some(b))),
        max_participants: req.max_participants.map(i64::from),
        category: req.category,
        image_url: req.image_url,
    };

    let row = blocking(move || {
        state.db.update_trip(&tid, patch)?;
        state.db.get_trip(&tid)
    })
    .await?
    .ok_or(ApiError::NotFound("trip"))?;

    Ok(Json(json!({ "trip": trip_response(row) })))
}

pub async fn delete_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = id.to_string();

    let st = state.clone();
    let lookup = tid.clone();
    let existing = blocking(move || st.db.get_trip(&lookup))
        .await?
        .ok_or(ApiError::NotFound("trip"))?;

    authorize_owner(&claims, &existing.creator_id)?;

    blocking(move || state.db.delete_trip(&tid)).await?;

    Ok(Json(json!({ "deleted": true })))
}

pub async fn join_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinTripRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let display_name = required_text(req.name, "name")?;
    let tid = id.to_string();
    let uid = claims.sub.to_string();

    let joined = blocking(move || {
        if state.db.get_trip(&tid)?.is_none() {
            return Ok(None);
        }

        // Snapshot the caller's interests alongside the display name.
        let interests = state
            .db
            .get_user_by_id(&uid)?
            .map(|u| u.interests)
            .unwrap_or_else(|| "[]".to_string());

        let outcome = state.db.join_trip(
            &Uuid::new_v4().to_string(),
            &tid,
            &uid,
            &display_name,
            &interests,
        )?;

        let participant = match outcome {
            JoinOutcome::Joined => state.db.get_participant(&tid, &uid)?,
            _ => None,
        };
        Ok(Some((outcome, participant)))
    })
    .await?;

    let (outcome, participant) = joined.ok_or(ApiError::NotFound("trip"))?;

    match outcome {
        JoinOutcome::Full => Err(ApiError::BadRequest("trip is full".into())),
        JoinOutcome::AlreadyJoined => {
            Err(ApiError::BadRequest("already joined this trip".into()))
        }
        JoinOutcome::Joined => {
            let participant = participant.ok_or(ApiError::NotFound("participant"))?;
            Ok((
                StatusCode::CREATED,
                Json(json!({ "participant": participant_response(participant) })),
            ))
        }
    }
}

pub async fn leave_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = id.to_string();
    let uid = claims.sub.to_string();

    let removed = blocking(move || state.db.leave_trip(&tid, &uid)).await?;
    if !removed {
        return Err(ApiError::NotFound("participant"));
    }

    Ok(Json(json!({ "left": true })))
}

/// Admin-only maintenance operation: remove trips whose end date is more than
/// a day in the past. Also runs on a timer in the server binary.
pub async fn sweep_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.role != "admin" {
        return Err(ApiError::Forbidden);
    }

    let swept = blocking(move || state.db.sweep_expired_trips()).await?;

    Ok(Json(json!({ "swept": swept })))
}

#[cfg(test)]
mod tests {
    use super::normalize_budget;

    #[test]
    fn budget_below_minimum_falls_back_to_default() {
        assert_eq!(normalize_budget(Some(50.0)), 1000.0);
        assert_eq!(normalize_budget(Some(99.99)), 1000.0);
        assert_eq!(normalize_budget(None), 1000.0);
    }

    #[test]
    fn budget_at_or_above_minimum_is_kept() {
        assert_eq!(normalize_budget(Some(100.0)), 100.0);
        assert_eq!(normalize_budget(Some(500.0)), 500.0);
    }
}
