//! Local `SQLite` store for mirrored tickets and their conversations

mod schema;
pub mod ticket;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::Result;

pub use schema::SCHEMA_VERSION;
pub use ticket::{NewTicket, SqliteTicketStore};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Concurrent ticket turns each hold a connection only for single statements
const FILE_POOL_SIZE: u32 = 4;

/// Open (or create) the ticket store at `path` and bring its schema up to date
///
/// # Errors
///
/// Returns error if the directory cannot be created, the file cannot be
/// opened, or a migration fails
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    let pool = migrated_pool(manager, FILE_POOL_SIZE)?;

    tracing::info!(path = %path.display(), version = SCHEMA_VERSION, "ticket store opened");
    Ok(pool)
}

/// In-memory store for tests and one-off tools
///
/// The pool holds a single connection: every `:memory:` connection is its own
/// database.
///
/// # Errors
///
/// Returns error if the schema cannot be created
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    migrated_pool(manager, 1)
}

fn migrated_pool(manager: SqliteConnectionManager, size: u32) -> Result<DbPool> {
    let pool = Pool::builder().max_size(size).build(manager)?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}
