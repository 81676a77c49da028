use crate::models::{JoinOutcome, MessageRow, NewTrip, ParticipantRow, TripPatch, TripRow, UserRow};
use crate::{Database, now_ts};
use anyhow::Result;
use rusqlite::types::ToSql;

/// Trip list ordering selector. `ByCategories` carries the caller's interest
/// set and restricts results to matching categories.
pub enum TripOrder {
    Recent,
    Popular,
    ByCategories(Vec<String>),
}

#[derive(Default)]
pub struct TripFilter {
    pub destination: Option<String>,
    pub category: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Database {
    // -- Users --

    /// Returns false when the email is already taken. The UNIQUE constraint
    /// is the single source of truth, so concurrent registrations cannot
    /// slip past a separate lookup.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        name: &str,
        password_hash: &str,
        interests_json: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let result = conn.execute(
                "INSERT INTO users (id, email, name, password, role, interests, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'user', ?5, ?6)",
                rusqlite::params![id, email, name, password_hash, interests_json, now_ts()],
            );

            match result {
                Ok(_) => Ok(true),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE email = ?1"))?;
            let row = stmt.query_row([email], map_user_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE id = ?1"))?;
            let row = stmt.query_row([id], map_user_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{USER_SELECT} ORDER BY name ASC"))?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch users for a set of ids (conversation counterparts).
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!("{USER_SELECT} WHERE id IN ({})", placeholders.join(", "));

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_user(
        &self,
        id: &str,
        name: Option<&str>,
        password_hash: Option<&str>,
        interests_json: Option<&str>,
    ) -> Result<()> {
        let mut sets = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(v) = name {
            params.push(Box::new(v.to_string()));
            sets.push(format!("name = ?{}", params.len()));
        }
        if let Some(v) = password_hash {
            params.push(Box::new(v.to_string()));
            sets.push(format!("password = ?{}", params.len()));
        }
        if let Some(v) = interests_json {
            params.push(Box::new(v.to_string()));
            sets.push(format!("interests = ?{}", params.len()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        params.push(Box::new(id.to_string()));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );

        self.with_conn_mut(|conn| {
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, refs.as_slice())?;
            Ok(())
        })
    }

    // -- Trips --

    pub fn insert_trip(&self, trip: &NewTrip) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO trips (id, title, destination, description, start_date, end_date,
                                    budget, max_participants, category, image_url, creator_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    trip.id,
                    trip.title,
                    trip.destination,
                    trip.description,
                    trip.start_date,
                    trip.end_date,
                    trip.budget,
                    trip.max_participants,
                    trip.category,
                    trip.image_url,
                    trip.creator_id,
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_trip(&self, id: &str) -> Result<Option<TripRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{TRIP_SELECT} WHERE t.id = ?1"))?;
            let row = stmt.query_row([id], map_trip_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_trips(&self, filter: &TripFilter, order: &TripOrder) -> Result<Vec<TripRow>> {
        let mut sql = format!("{TRIP_SELECT} WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(dest) = &filter.destination {
            params.push(Box::new(format!("%{}%", dest)));
            sql.push_str(&format!(" AND t.destination LIKE ?{}", params.len()));
        }
        if let Some(cat) = &filter.category {
            params.push(Box::new(cat.clone()));
            sql.push_str(&format!(" AND t.category = ?{}", params.len()));
        }
        if let Some(from) = &filter.from {
            params.push(Box::new(from.clone()));
            sql.push_str(&format!(
                " AND datetime(t.start_date) >= datetime(?{})",
                params.len()
            ));
        }
        if let Some(to) = &filter.to {
            params.push(Box::new(to.clone()));
            sql.push_str(&format!(
                " AND datetime(t.start_date) <= datetime(?{})",
                params.len()
            ));
        }

        match order {
            TripOrder::Recent => sql.push_str(" ORDER BY t.created_at DESC"),
            TripOrder::Popular => {
                sql.push_str(" ORDER BY participant_count DESC, t.created_at DESC")
            }
            TripOrder::ByCategories(categories) => {
                let placeholders: Vec<String> = categories
                    .iter()
                    .map(|c| {
                        params.push(Box::new(c.clone()));
                        format!("?{}", params.len())
                    })
                    .collect();
                sql.push_str(&format!(
                    " AND t.category IN ({}) ORDER BY t.created_at DESC",
                    placeholders.join(", ")
                ));
            }
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt
                .query_map(refs.as_slice(), map_trip_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_trip(&self, id: &str, patch: TripPatch) -> Result<()> {
        let mut sets = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(v) = patch.title {
            params.push(Box::new(v));
            sets.push(format!("title = ?{}", params.len()));
        }
        if let Some(v) = patch.destination {
            params.push(Box::new(v));
            sets.push(format!("destination = ?{}", params.len()));
        }
        if let Some(v) = patch.description {
            params.push(Box::new(v));
            sets.push(format!("description = ?{}", params.len()));
        }
        if let Some(v) = patch.start_date {
            params.push(Box::new(v));
            sets.push(format!("start_date = ?{}", params.len()));
        }
        if let Some(v) = patch.end_date {
            params.push(Box::new(v));
            sets.push(format!("end_date = ?{}", params.len()));
        }
        if let Some(v) = patch.budget {
            params.push(Box::new(v));
            sets.push(format!("budget = ?{}", params.len()));
        }
        if let Some(v) = patch.max_participants {
            params.push(Box::new(v));
            sets.push(format!("max_participants = ?{}", params.len()));
        }
        if let Some(v) = patch.category {
            params.push(Box::new(v));
            sets.push(format!("category = ?{}", params.len()));
        }
        if let Some(v) = patch.image_url {
            params.push(Box::new(v));
            sets.push(format!("image_url = ?{}", params.len()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        params.push(Box::new(id.to_string()));
        let sql = format!(
            "UPDATE trips SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );

        self.with_conn_mut(|conn| {
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, refs.as_slice())?;
            Ok(())
        })
    }

    /// Returns true if a row was deleted. Participants and group messages go
    /// with it via ON DELETE CASCADE.
    pub fn delete_trip(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changes = conn.execute("DELETE FROM trips WHERE id = ?1", [id])?;
            Ok(changes > 0)
        })
    }

    /// Delete trips whose end_date is more than one day in the past.
    /// Returns the number of trips removed.
    pub fn sweep_expired_trips(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changes = conn.execute(
                "DELETE FROM trips
                 WHERE end_date IS NOT NULL
                   AND datetime(end_date) < datetime('now', '-1 day')",
                [],
            )?;
            Ok(changes)
        })
    }

    // -- Participants --

    /// Atomic capacity-checked join. The insert only fires while the current
    /// participant count is below max_participants, and the
    /// UNIQUE(trip_id, user_id) constraint rejects duplicate joins; both
    /// checks happen inside the single writer statement, so there is no
    /// read-then-insert race window.
    pub fn join_trip(
        &self,
        id: &str,
        trip_id: &str,
        user_id: &str,
        name: &str,
        interests_json: &str,
    ) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let result = conn.execute(
                "INSERT INTO participants (id, trip_id, user_id, name, interests, joined_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE (SELECT COUNT(*) FROM participants WHERE trip_id = ?2)
                     < (SELECT max_participants FROM trips WHERE id = ?2)",
                rusqlite::params![id, trip_id, user_id, name, interests_json, now_ts()],
            );

            match result {
                Ok(0) => Ok(JoinOutcome::Full),
                Ok(_) => Ok(JoinOutcome::Joined),
                Err(e) if is_constraint_violation(&e) => Ok(JoinOutcome::AlreadyJoined),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns true if a participant row was deleted.
    pub fn leave_trip(&self, trip_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changes = conn.execute(
                "DELETE FROM participants WHERE trip_id = ?1 AND user_id = ?2",
                [trip_id, user_id],
            )?;
            Ok(changes > 0)
        })
    }

    pub fn get_trip_participants(&self, trip_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trip_id, user_id, name, interests, joined_at
                 FROM participants
                 WHERE trip_id = ?1
                 ORDER BY joined_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([trip_id], |row| {
                    Ok(ParticipantRow {
                        id: row.get(0)?,
                        trip_id: row.get(1)?,
                        user_id: row.get(2)?,
                        name: row.get(3)?,
                        interests: row.get(4)?,
                        joined_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_participant(&self, trip_id: &str, user_id: &str) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trip_id, user_id, name, interests, joined_at
                 FROM participants
                 WHERE trip_id = ?1 AND user_id = ?2",
            )?;
            let row = stmt
                .query_row([trip_id, user_id], |row| {
                    Ok(ParticipantRow {
                        id: row.get(0)?,
                        trip_id: row.get(1)?,
                        user_id: row.get(2)?,
                        name: row.get(3)?,
                        interests: row.get(4)?,
                        joined_at: row.get(5)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn is_participant(&self, trip_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM participants WHERE trip_id = ?1 AND user_id = ?2",
                [trip_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn participant_count(&self, trip_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM participants WHERE trip_id = ?1",
                [trip_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        content: &str,
        sender_id: &str,
        trip_id: Option<&str>,
        recipient_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, content, sender_id, trip_id, recipient_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, content, sender_id, trip_id, recipient_id, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_trip_messages(&self, trip_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE m.trip_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([trip_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All private messages between two users, both directions, oldest first.
    pub fn get_private_messages(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.trip_id IS NULL
                   AND ((m.sender_id = ?1 AND m.recipient_id = ?2)
                     OR (m.sender_id = ?2 AND m.recipient_id = ?1))
                 ORDER BY m.created_at ASC, m.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([a, b], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All private messages the user sent or received, newest first. The
    /// conversation projection is derived from this in the API layer.
    pub fn get_private_messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.trip_id IS NULL
                   AND (m.sender_id = ?1 OR m.recipient_id = ?1)
                 ORDER BY m.created_at DESC, m.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns true if a message was deleted.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changes = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changes > 0)
        })
    }

    /// Bulk-delete the private thread between two users, both directions.
    /// Returns the number of messages removed.
    pub fn delete_conversation(&self, a: &str, b: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changes = conn.execute(
                "DELETE FROM messages
                 WHERE trip_id IS NULL
                   AND ((sender_id = ?1 AND recipient_id = ?2)
                     OR (sender_id = ?2 AND recipient_id = ?1))",
                [a, b],
            )?;
            Ok(changes)
        })
    }
}

const USER_SELECT: &str =
    "SELECT id, email, name, password, role, interests, created_at FROM users";

const TRIP_SELECT: &str = "SELECT t.id, t.title, t.destination, t.description, t.start_date,
            t.end_date, t.budget, t.max_participants, t.category, t.image_url, t.creator_id,
            (SELECT COUNT(*) FROM participants p WHERE p.trip_id = t.id) AS participant_count,
            t.created_at
     FROM trips t";

const MESSAGE_SELECT: &str = "SELECT m.id, m.content, m.sender_id, m.trip_id, m.recipient_id,
            u.email, u.name, u.role, u.interests, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.sender_id = u.id";

fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        interests: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_trip_row(row: &rusqlite::Row) -> rusqlite::Result<TripRow> {
    Ok(TripRow {
        id: row.get(0)?,
        title: row.get(1)?,
        destination: row.get(2)?,
        description: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        budget: row.get(6)?,
        max_participants: row.get(7)?,
        category: row.get(8)?,
        image_url: row.get(9)?,
        creator_id: row.get(10)?,
        participant_count: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        sender_id: row.get(2)?,
        trip_id: row.get(3)?,
        recipient_id: row.get(4)?,
        sender_email: row.get(5)?,
        sender_name: row.get(6)?,
        sender_role: row.get(7)?,
        sender_interests: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SecondsFormat, Utc};
    use uuid::Uuid;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn ts_days_from_now(days: i64) -> String {
        (Utc::now() + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn ts_hours_ago(hours: i64) -> String {
        (Utc::now() - Duration::hours(hours)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn add_user(db: &Database, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, email, "Test User", "$argon2$fake", r#"["hiking"]"#)
            .unwrap();
        id
    }

    fn add_trip(db: &Database, creator: &str, max_participants: i64) -> String {
        add_trip_ending(db, creator, max_participants, None)
    }

    fn add_trip_starting(
        db: &Database,
        creator: &str,
        days_from_now: i64,
        category: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_trip(&NewTrip {
            id: id.clone(),
            title: "Alps loop".into(),
            destination: "Innsbruck".into(),
            description: String::new(),
            start_date: ts_days_from_now(days_from_now),
            end_date: None,
            budget: 1000.0,
            max_participants: 10,
            category: Some(category.into()),
            image_url: None,
            creator_id: creator.into(),
        })
        .unwrap();
        id
    }

    fn add_trip_ending(
        db: &Database,
        creator: &str,
        max_participants: i64,
        end_date: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_trip(&NewTrip {
            id: id.clone(),
            title: "Alps loop".into(),
            destination: "Innsbruck".into(),
            description: String::new(),
            start_date: ts_days_from_now(7),
            end_date,
            budget: 1000.0,
            max_participants,
            category: Some("hiking".into()),
            image_url: None,
            creator_id: creator.into(),
        })
        .unwrap();
        id
    }

    fn join(db: &Database, trip: &str, user: &str) -> JoinOutcome {
        db.join_trip(&Uuid::new_v4().to_string(), trip, user, "Display", "[]")
            .unwrap()
    }

    #[test]
    fn join_respects_capacity() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip(&db, &creator, 2);

        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");
        let c = add_user(&db, "c@example.com");

        assert_eq!(join(&db, &trip, &a), JoinOutcome::Joined);
        assert_eq!(join(&db, &trip, &b), JoinOutcome::Joined);
        assert_eq!(db.participant_count(&trip).unwrap(), 2);

        // At capacity: the conditional insert must not fire.
        assert_eq!(join(&db, &trip, &c), JoinOutcome::Full);
        assert_eq!(db.participant_count(&trip).unwrap(), 2);
    }

    #[test]
    fn duplicate_join_rejected() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip(&db, &creator, 10);
        let a = add_user(&db, "a@example.com");

        assert_eq!(join(&db, &trip, &a), JoinOutcome::Joined);
        assert_eq!(join(&db, &trip, &a), JoinOutcome::AlreadyJoined);
        assert_eq!(db.participant_count(&trip).unwrap(), 1);
    }

    #[test]
    fn leave_removes_participant_once() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip(&db, &creator, 10);
        let a = add_user(&db, "a@example.com");

        join(&db, &trip, &a);
        assert!(db.leave_trip(&trip, &a).unwrap());
        assert!(!db.leave_trip(&trip, &a).unwrap());
        assert_eq!(db.participant_count(&trip).unwrap(), 0);
    }

    #[test]
    fn sweep_removes_expired_trips_and_cascades() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let a = add_user(&db, "a@example.com");

        let expired = add_trip_ending(&db, &creator, 10, Some(ts_hours_ago(72)));
        let recent = add_trip_ending(&db, &creator, 10, Some(ts_hours_ago(12)));
        let open_ended = add_trip(&db, &creator, 10);

        join(&db, &expired, &a);
        db.insert_message(
            &Uuid::new_v4().to_string(),
            "see you there",
            &a,
            Some(&expired),
            None,
        )
        .unwrap();

        assert_eq!(db.sweep_expired_trips().unwrap(), 1);

        assert!(db.get_trip(&expired).unwrap().is_none());
        assert!(db.get_trip(&recent).unwrap().is_some());
        assert!(db.get_trip(&open_ended).unwrap().is_some());

        // Cascade took the participant row and the group messages with it.
        assert_eq!(db.participant_count(&expired).unwrap(), 0);
        assert!(db.get_trip_messages(&expired).unwrap().is_empty());
    }

    #[test]
    fn private_messages_cover_both_directions_oldest_first() {
        let db = db();
        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");

        for content in ["first", "second"] {
            db.insert_message(&Uuid::new_v4().to_string(), content, &a, None, Some(&b))
                .unwrap();
        }
        db.insert_message(&Uuid::new_v4().to_string(), "reply", &b, None, Some(&a))
            .unwrap();

        let thread = db.get_private_messages(&a, &b).unwrap();
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0].content, "first");
        assert_eq!(thread[2].content, "reply");
        assert_eq!(thread[2].sender_id, b);

        // Same thread from the counterpart's side.
        let mirrored = db.get_private_messages(&b, &a).unwrap();
        assert_eq!(mirrored.len(), 3);
    }

    #[test]
    fn messages_for_user_come_newest_first() {
        let db = db();
        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");

        db.insert_message(&Uuid::new_v4().to_string(), "older", &a, None, Some(&b))
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), "newer", &b, None, Some(&a))
            .unwrap();

        let rows = db.get_private_messages_for_user(&a).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "newer");
    }

    #[test]
    fn delete_conversation_is_scoped_to_the_pair() {
        let db = db();
        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");
        let c = add_user(&db, "c@example.com");

        db.insert_message(&Uuid::new_v4().to_string(), "to b", &a, None, Some(&b))
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), "from b", &b, None, Some(&a))
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), "to c", &a, None, Some(&c))
            .unwrap();

        assert_eq!(db.delete_conversation(&a, &b).unwrap(), 2);
        assert!(db.get_private_messages(&a, &b).unwrap().is_empty());
        assert_eq!(db.get_private_messages(&a, &c).unwrap().len(), 1);
    }

    #[test]
    fn trip_patch_persists_empty_description() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip(&db, &creator, 10);

        db.update_trip(
            &trip,
            TripPatch {
                description: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();

        let row = db.get_trip(&trip).unwrap().unwrap();
        assert_eq!(row.description, "");
        // Untouched fields keep their values.
        assert_eq!(row.title, "Alps loop");
    }

    #[test]
    fn trip_patch_clears_end_date_with_explicit_null() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip_ending(&db, &creator, 10, Some(ts_days_from_now(14)));

        db.update_trip(
            &trip,
            TripPatch {
                end_date: Some(None),
                ..Default::default()
            },
        )
        .unwrap();

        let row = db.get_trip(&trip).unwrap().unwrap();
        assert!(row.end_date.is_none());
    }

    #[test]
    fn list_trips_popular_orders_by_participant_count() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let quiet = add_trip(&db, &creator, 10);
        let busy = add_trip(&db, &creator, 10);

        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");
        join(&db, &busy, &a);
        join(&db, &busy, &b);
        join(&db, &quiet, &a);

        let rows = db
            .list_trips(&TripFilter::default(), &TripOrder::Popular)
            .unwrap();
        assert_eq!(rows[0].id, busy);
        assert_eq!(rows[0].participant_count, 2);
        assert_eq!(rows[1].id, quiet);
    }

    #[test]
    fn list_trips_filters_by_destination_substring() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        add_trip(&db, &creator, 10); // destination "Innsbruck"

        let hit = db
            .list_trips(
                &TripFilter {
                    destination: Some("nsbru".into()),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert_eq!(hit.len(), 1);

        let miss = db
            .list_trips(
                &TripFilter {
                    destination: Some("Lisbon".into()),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn list_trips_filters_by_exact_category() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        add_trip_starting(&db, &creator, 7, "hiking");
        let beach = add_trip_starting(&db, &creator, 14, "beach");

        let rows = db
            .list_trips(
                &TripFilter {
                    category: Some("beach".into()),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, beach);

        // Equality, not substring: a prefix must not match.
        let miss = db
            .list_trips(
                &TripFilter {
                    category: Some("hik".into()),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn list_trips_bounds_start_date_with_from_and_to() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let soon = add_trip_starting(&db, &creator, 5, "hiking");
        let later = add_trip_starting(&db, &creator, 30, "hiking");

        let after = db
            .list_trips(
                &TripFilter {
                    from: Some(ts_days_from_now(10)),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, later);

        let before = db
            .list_trips(
                &TripFilter {
                    to: Some(ts_days_from_now(10)),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, soon);

        let windowed = db
            .list_trips(
                &TripFilter {
                    from: Some(ts_days_from_now(1)),
                    to: Some(ts_days_from_now(10)),
                    ..Default::default()
                },
                &TripOrder::Recent,
            )
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].id, soon);
    }

    #[test]
    fn list_trips_by_categories_restricts_to_interest_set() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let hiking = add_trip(&db, &creator, 10); // category "hiking"

        let beach = Uuid::new_v4().to_string();
        db.insert_trip(&NewTrip {
            id: beach.clone(),
            title: "Shore week".into(),
            destination: "Faro".into(),
            description: String::new(),
            start_date: ts_days_from_now(7),
            end_date: None,
            budget: 1000.0,
            max_participants: 10,
            category: Some("beach".into()),
            image_url: None,
            creator_id: creator.clone(),
        })
        .unwrap();

        let rows = db
            .list_trips(
                &TripFilter::default(),
                &TripOrder::ByCategories(vec!["hiking".into()]),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, hiking);
        assert_ne!(rows[0].id, beach);
    }

    #[test]
    fn duplicate_email_is_reported_not_inserted() {
        let db = db();
        add_user(&db, "dup@example.com");

        let created = db
            .create_user(
                &Uuid::new_v4().to_string(),
                "dup@example.com",
                "Other",
                "$argon2$fake",
                "[]",
            )
            .unwrap();
        assert!(!created);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn group_and_private_paths_are_disjoint() {
        let db = db();
        let creator = add_user(&db, "creator@example.com");
        let trip = add_trip(&db, &creator, 10);
        let a = add_user(&db, "a@example.com");
        let b = add_user(&db, "b@example.com");

        join(&db, &trip, &a);
        db.insert_message(&Uuid::new_v4().to_string(), "group hello", &a, Some(&trip), None)
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), "private hello", &a, None, Some(&b))
            .unwrap();

        assert_eq!(db.get_trip_messages(&trip).unwrap().len(), 1);
        let private = db.get_private_messages(&a, &b).unwrap();
        assert_eq!(private.len(), 1);
        assert_eq!(private[0].content, "private hello");
    }
}
