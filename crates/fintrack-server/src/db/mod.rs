mod migrations;

use anyhow::Context;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Fixed-width UTC timestamp format; lexical order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn init_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

pub fn create_pool(sqlite_path: &str) -> anyhow::Result<DbPool> {
    if let Some(parent) = Path::new(sqlite_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let manager = SqliteConnectionManager::file(sqlite_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(init_connection);

    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .context("Failed to create database pool")?;

    migrate(&pool)?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every in-memory connection is its own
/// database, so the pool must never hand out a second one.
#[cfg(test)]
pub fn create_memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(init_connection);
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .expect("Failed to create in-memory pool");
    migrate(&pool).expect("Failed to migrate in-memory database");
    pool
}

fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get().context("Failed to get connection for migrations")?;
    migrations::run(&conn).context("Failed to run migrations")?;
    Ok(())
}
