//! Schema upgrades, tracked through SQLite's `user_version` pragma.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered by version; a step runs when `user_version` is below its number.
const STEPS: &[(u32, &str, Step)] = &[(1, "initial", v001_initial::up)];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    tracing::debug!(version, latest = STEPS.len(), "Index schema version");

    for &(target, name, step) in STEPS {
        if version >= target {
            continue;
        }
        tracing::info!(version = target, step = name, "Migrating index schema");
        step(conn).map_err(|e| StoreError::Migration {
            version: target,
            reason: e.to_string(),
        })?;
        conn.pragma_update(None, "user_version", target)?;
        version = target;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
