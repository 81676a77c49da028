use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                interests   TEXT NOT NULL DEFAULT '[]',
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE trips (
                id               TEXT PRIMARY KEY,
                title            TEXT NOT NULL,
                destination      TEXT NOT NULL,
                description      TEXT NOT NULL DEFAULT '',
                start_date       TEXT NOT NULL,
                end_date         TEXT,
                budget           REAL NOT NULL,
                max_participants INTEGER NOT NULL DEFAULT 10,
                category         TEXT,
                image_url        TEXT,
                creator_id       TEXT NOT NULL REFERENCES users(id),
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_trips_created ON trips(created_at);
            CREATE INDEX idx_trips_end_date ON trips(end_date);

            CREATE TABLE participants (
                id          TEXT PRIMARY KEY,
                trip_id     TEXT NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                name        TEXT NOT NULL,
                interests   TEXT NOT NULL DEFAULT '[]',
                joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(trip_id, user_id)
            );

            CREATE INDEX idx_participants_trip ON participants(trip_id);

            -- Group messages carry trip_id, private messages carry
            -- recipient_id; a message never carries both.
            CREATE TABLE messages (
                id           TEXT PRIMARY KEY,
                content      TEXT NOT NULL,
                sender_id    TEXT NOT NULL REFERENCES users(id),
                trip_id      TEXT REFERENCES trips(id) ON DELETE CASCADE,
                recipient_id TEXT REFERENCES users(id),
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (trip_id IS NULL OR recipient_id IS NULL)
            );

            CREATE INDEX idx_messages_trip ON messages(trip_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
