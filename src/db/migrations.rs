use std::collections::HashSet;

use anyhow::Context;
use rusqlite::Connection;

/// Applied in order; names are recorded so each runs once per database.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Runs every migration not yet recorded in `_migrations`, each in its own
/// transaction.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM _migrations")?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names
            .collect::<rusqlite::Result<_>>()
            .context("failed to read applied migrations")?
    };

    for (name, sql) in MIGRATIONS.iter().filter(|(name, _)| !applied.contains(*name)) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply migration {name}"))?;
        tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration {name}"))?;
        tx.commit()?;

        tracing::info!(migration = name, "applied migration");
    }

    Ok(())
}
