pub mod migrations;
pub mod queries;

use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

/// Opens the booking database and brings its schema up to date.
/// `":memory:"` gives a throwaway database.
pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("failed to open database at {path}"))?;

    if path != ":memory:" {
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(Duration::from_secs(5))
        .context("failed to set busy timeout")?;

    migrations::run_migrations(&conn)?;
    tracing::debug!(path, "database ready");

    Ok(conn)
}
