use rusqlite::Connection;

use crate::error::Result;

/// Create the sessions and messages tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            session_key   TEXT NOT NULL,
            channel       TEXT NOT NULL,
            external_id   TEXT NOT NULL,
            user_id       TEXT,
            role          TEXT NOT NULL,
            title         TEXT,
            message_count INTEGER NOT NULL DEFAULT 0,
            cost_usd      REAL NOT NULL DEFAULT 0,
            tokens_in     INTEGER NOT NULL DEFAULT 0,
            tokens_out    INTEGER NOT NULL DEFAULT 0,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active_key
            ON sessions(session_key) WHERE active = 1;
        CREATE INDEX IF NOT EXISTS idx_sessions_channel
            ON sessions(channel, updated_at DESC);

        CREATE TABLE IF NOT EXISTS session_messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL,
            role          TEXT NOT NULL,
            content       TEXT NOT NULL,
            task_id       TEXT,
            model         TEXT,
            cost_usd      REAL,
            tokens_in     INTEGER,
            tokens_out    INTEGER,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_messages_session
            ON session_messages(session_id, id DESC);",
    )?;
    Ok(())
}
