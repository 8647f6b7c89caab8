//! `SQLite`-backed ticket store

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::{DbConn, DbPool};
use crate::llm::Role;
use crate::tickets::{ConversationTurn, Priority, Ticket, TicketStore};
use crate::{Error, Result};

/// Fields needed to mirror a ticket into the local store
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub requester_id: String,
    pub subject: String,
    pub organization: Option<String>,
    pub priority: Priority,
}

/// Ticket store backed by the local database
#[derive(Clone)]
pub struct SqliteTicketStore {
    pool: DbPool,
}

impl SqliteTicketStore {
    /// Create a new ticket store
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Insert a ticket and return it
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let conn = self.conn()?;
        let id = Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());

        conn.execute(
            "INSERT INTO tickets (id, requester_id, subject, organization, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                new.requester_id,
                new.subject,
                new.organization,
                new.priority.as_str(),
                now
            ],
        )?;

        Ok(Ticket {
            id,
            requester_id: new.requester_id,
            subject: new.subject,
            organization: new.organization,
            priority: new.priority,
            escalated: false,
            escalation_reason: None,
        })
    }

    fn update_ticket(&self, ticket_id: &str, sql: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(sql, params![value, timestamp(Utc::now()), ticket_id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("ticket {ticket_id}")));
        }
        Ok(())
    }
}

impl TicketStore for SqliteTicketStore {
    fn ticket(&self, ticket_id: &str) -> Result<Ticket> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, requester_id, subject, organization, priority, escalated, escalation_reason
                 FROM tickets WHERE id = ?1",
                [ticket_id],
                |row| {
                    Ok((
                        Ticket {
                            id: row.get(0)?,
                            requester_id: row.get(1)?,
                            subject: row.get(2)?,
                            organization: row.get(3)?,
                            priority: Priority::Medium,
                            escalated: row.get::<_, i64>(5)? != 0,
                            escalation_reason: row.get(6)?,
                        },
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((mut ticket, priority)) = row else {
            return Err(Error::NotFound(format!("ticket {ticket_id}")));
        };
        ticket.priority = priority.parse().map_err(Error::Corrupt)?;
        Ok(ticket)
    }

    fn append_message(&self, ticket_id: &str, role: Role, content: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ticket_messages (id, ticket_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                ticket_id,
                role_str(role),
                content,
                timestamp(Utc::now())
            ],
        )?;
        Ok(())
    }

    fn recent_messages(&self, ticket_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM ticket_messages
             WHERE ticket_id = ?1 ORDER BY rowid DESC LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut turns: Vec<ConversationTurn> = stmt
            .query_map(params![ticket_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .filter_map(std::result::Result::ok)
            .filter_map(|(role, content, created_at)| {
                Some(ConversationTurn {
                    role: parse_role(&role)?,
                    content,
                    created_at: parse_datetime(&created_at),
                })
            })
            .collect();

        turns.reverse();
        Ok(turns)
    }

    fn set_priority(&self, ticket_id: &str, priority: Priority) -> Result<()> {
        self.update_ticket(
            ticket_id,
            "UPDATE tickets SET priority = ?1, updated_at = ?2 WHERE id = ?3",
            priority.as_str(),
        )
    }

    fn escalate(&self, ticket_id: &str, reason: &str) -> Result<()> {
        self.update_ticket(
            ticket_id,
            "UPDATE tickets SET escalated = 1, escalation_reason = ?1, updated_at = ?2 WHERE id = ?3",
            reason,
        )
    }
}

const fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn parse_role(s: &str) -> Option<Role> {
    match s {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
