mod schema;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::models::*;

/// Persistent store for stack state.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Raw `resources` row before JSON decoding.
struct ResourceRow {
    name: String,
    kind: String,
    id: String,
    inputs: String,
    outputs: String,
    dependencies: String,
    created_at: String,
    updated_at: String,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("State path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open state store {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "sitestack")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("state.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Highest applied schema migration, `None` before [`Database::migrate`].
    pub fn schema_version(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::current_version(&conn)
    }

    // ============================================================
    // Stack operations
    // ============================================================

    pub fn list_stacks(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT name FROM stacks ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Load everything recorded for `stack`. A stack that was never applied loads empty.
    pub fn load_stack(&self, stack: &str) -> Result<StackState> {
        let rows = {
            let conn = self.conn.lock().expect("database lock poisoned");
            let mut stmt = conn.prepare(
                "SELECT name, kind, resource_id, inputs, outputs, dependencies, created_at, updated_at
                 FROM resources WHERE stack = ? ORDER BY name",
            )?;
            let rows = stmt
                .query_map([stack], |row| {
                    Ok(ResourceRow {
                        name: row.get(0)?,
                        kind: row.get(1)?,
                        id: row.get(2)?,
                        inputs: row.get(3)?,
                        outputs: row.get(4)?,
                        dependencies: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut state = StackState::empty(stack);
        for row in rows {
            let resource = decode_resource(row)?;
            state.resources.insert(resource.name.clone(), resource);
        }
        state.exports = self.get_exports(stack)?;
        Ok(state)
    }

    pub fn delete_stack(&self, stack: &str) -> Result<bool> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM resources WHERE stack = ?", [stack])?;
        tx.execute("DELETE FROM exports WHERE stack = ?", [stack])?;
        let rows = tx.execute("DELETE FROM stacks WHERE name = ?", [stack])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // ============================================================
    // Resource operations
    // ============================================================

    pub fn get_resource(&self, stack: &str, name: &str) -> Result<Option<ResourceState>> {
        let row = {
            let conn = self.conn.lock().expect("database lock poisoned");
            conn.query_row(
                "SELECT name, kind, resource_id, inputs, outputs, dependencies, created_at, updated_at
                 FROM resources WHERE stack = ? AND name = ?",
                (stack, name),
                |row| {
                    Ok(ResourceRow {
                        name: row.get(0)?,
                        kind: row.get(1)?,
                        id: row.get(2)?,
                        inputs: row.get(3)?,
                        outputs: row.get(4)?,
                        dependencies: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?
        };
        row.map(decode_resource).transpose()
    }

    /// Insert or replace the record of one applied resource.
    pub fn save_resource(&self, stack: &str, resource: &ResourceState) -> Result<()> {
        let inputs = serde_json::to_string(&resource.inputs)?;
        let outputs = serde_json::to_string(&resource.outputs)?;
        let dependencies = serde_json::to_string(&resource.dependencies)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        touch_stack(&conn, stack)?;
        conn.execute(
            "INSERT INTO resources
                (stack, name, kind, resource_id, inputs, outputs, dependencies, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(stack, name) DO UPDATE SET
                kind = excluded.kind,
                resource_id = excluded.resource_id,
                inputs = excluded.inputs,
                outputs = excluded.outputs,
                dependencies = excluded.dependencies,
                updated_at = excluded.updated_at",
            (
                stack,
                &resource.name,
                resource.kind.as_str(),
                &resource.id,
                &inputs,
                &outputs,
                &dependencies,
                resource.created_at.to_rfc3339(),
                resource.updated_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn delete_resource(&self, stack: &str, name: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM resources WHERE stack = ? AND name = ?",
            (stack, name),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Export operations
    // ============================================================

    pub fn get_exports(&self, stack: &str) -> Result<BTreeMap<String, Value>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT key, value FROM exports WHERE stack = ? ORDER BY key")?;
        let rows = stmt
            .query_map([stack], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, value)| {
                let value = serde_json::from_str(&value)
                    .with_context(|| format!("Corrupt export value for '{}'", key))?;
                Ok((key, value))
            })
            .collect()
    }

    /// Replace the whole export table of `stack`.
    pub fn replace_exports(&self, stack: &str, exports: &BTreeMap<String, Value>) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        touch_stack(&conn, stack)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM exports WHERE stack = ?", [stack])?;
        for (key, value) in exports {
            tx.execute(
                "INSERT INTO exports (stack, key, value) VALUES (?, ?, ?)",
                (stack, key, serde_json::to_string(value)?),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn touch_stack(conn: &Connection, stack: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO stacks (name, created_at, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at",
        (stack, &now, &now),
    )?;
    Ok(())
}

fn decode_resource(row: ResourceRow) -> Result<ResourceState> {
    let kind = ResourceKind::from_str(&row.kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown resource kind '{}' for '{}'", row.kind, row.name))?;
    let context = || format!("Corrupt state record for '{}'", row.name);
    Ok(ResourceState {
        kind,
        id: row.id.clone(),
        inputs: serde_json::from_str(&row.inputs).with_context(context)?,
        outputs: serde_json::from_str(&row.outputs).with_context(context)?,
        dependencies: serde_json::from_str(&row.dependencies).with_context(context)?,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
        name: row.name.clone(),
    })
}

fn parse_datetime(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
