//! Versioned schema for the ticket store
//!
//! Each entry of [`MIGRATIONS`] moves the database from version `n` to `n + 1`
//! and runs in its own transaction together with the `user_version` bump.

use rusqlite::Connection;

use crate::Result;

const MIGRATIONS: &[&str] = &[
    // 1: tickets mirrored from the helpdesk and their conversation
    r"
    CREATE TABLE tickets (
        id TEXT PRIMARY KEY,
        requester_id TEXT NOT NULL,
        subject TEXT NOT NULL,
        organization TEXT,
        priority TEXT NOT NULL DEFAULT 'Medium'
            CHECK(priority IN ('Low', 'Medium', 'High', 'Critical')),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX idx_tickets_requester ON tickets(requester_id);

    CREATE TABLE ticket_messages (
        id TEXT PRIMARY KEY,
        ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
        content TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX idx_ticket_messages_ticket ON ticket_messages(ticket_id);
    ",
    // 2: escalation flag written by escalate_to_human
    r"
    ALTER TABLE tickets ADD COLUMN escalated INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE tickets ADD COLUMN escalation_reason TEXT;
    ",
];

/// Schema version after all migrations
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Apply every migration newer than the database's `user_version`
///
/// # Errors
///
/// Returns error if a migration fails; that migration is rolled back
pub fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (version, sql) in (1..).zip(MIGRATIONS).skip_while(|(v, _)| *v <= current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::debug!(version, "applied schema migration");
    }

    Ok(())
}
