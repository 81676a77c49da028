//! Database row types — these map directly to SQLite rows.
//! Distinct from the wayfare-types API models to keep the DB layer
//! independent. Interests are stored as JSON array text and decoded at the
//! API boundary.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: String,
    pub interests: String,
    pub created_at: String,
}

pub struct TripRow {
    pub id: String,
    pub title: String,
    pub destination: String,
    pub description: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub budget: f64,
    pub max_participants: i64,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub creator_id: String,
    pub participant_count: i64,
    pub created_at: String,
}

pub struct ParticipantRow {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub name: String,
    pub interests: String,
    pub joined_at: String,
}

/// Message row with the sender summary joined in (avoids N+1 lookups).
pub struct MessageRow {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub trip_id: Option<String>,
    pub recipient_id: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub sender_role: Option<String>,
    pub sender_interests: Option<String>,
    pub created_at: String,
}

/// Insert payload for a new trip. Defaults are applied by the caller before
/// this reaches the database.
pub struct NewTrip {
    pub id: String,
    pub title: String,
    pub destination: String,
    pub description: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub budget: f64,
    pub max_participants: i64,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub creator_id: String,
}

/// Per-field trip patch; `None` leaves the column untouched. Nested options
/// on the nullable columns let an explicit null clear the value.
#[derive(Default)]
pub struct TripPatch {
    pub title: Option<String>,
    pub destination: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<Option<String>>,
    pub budget: Option<f64>,
    pub max_participants: Option<i64>,
    pub category: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
}

/// Outcome of the atomic join insert.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Full,
    AlreadyJoined,
}
