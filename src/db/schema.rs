use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

/// Ordered list of `(version, name, sql)`. Versions are applied in this order and never
/// edited once released.
const MIGRATIONS: &[(&str, &str, &str)] = &[(
    "001",
    "initial",
    include_str!("migrations/001_initial.sql"),
)];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Bring the state store schema up to date.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(TRACKING_TABLE)
        .context("Failed to create schema_migrations table")?;

    let applied = applied_versions(conn)?;
    let pending = MIGRATIONS
        .iter()
        .filter(|(version, _, _)| !applied.contains(*version));

    for &(version, name, sql) in pending {
        tracing::info!(version, name, "Applying state store migration");

        // The schema change and its bookkeeping row commit together.
        let tx = conn
            .unchecked_transaction()
            .context("Failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration {}: {}", version, name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
            (version, name, Utc::now().to_rfc3339()),
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(versions)
}

/// Highest applied migration version, if any.
pub fn current_version(conn: &Connection) -> Result<Option<String>> {
    let version = conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get(0)
    })?;
    Ok(version)
}
