//! SQLite connection setup shared by the message store and the SQLite event queue.

use std::time::Duration;

use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    SqlitePool,
};

fn connect_options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full)
}

/// Opens a pool on the database file at `path`, creating it if missing.
pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let opts = connect_options().filename(path).create_if_missing(true);

    SqlitePoolOptions::new().connect_with(opts).await
}

/// Opens a pool on a private in-memory database.
///
/// The pool is pinned to a single long-lived connection since every
/// in-memory connection would otherwise see its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(connect_options().in_memory(true))
        .await
}
