//! Ordered schema migrations, applied atomically in ascending version order
//! at startup (P10). The ledger format mirrors the persistence layout:
//! `(version INTEGER PRIMARY KEY, name TEXT, applied_at TIMESTAMP)`, each
//! version applied exactly once.

use crate::error::StoreResult;
use crate::relational::RelationalStore;

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub apply: fn(&mut RelationalStore) -> StoreResult<()>,
}

/// The built-in migration set for this schema. New migrations are appended
/// here with a strictly increasing version; nothing here rewrites history.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "initial_schema",
        apply: |_store| Ok(()),
    }]
}

/// Apply every migration whose version is not yet in the ledger, in
/// ascending order, recording each as it completes. A startup sweep calls
/// this before the store opens for traffic.
pub fn run_pending(store: &mut RelationalStore, migrations: &[Migration]) -> StoreResult<()> {
    let applied = store.applied_migration_versions();
    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by_key(|m| m.version);

    for migration in ordered {
        if applied.contains(&migration.version) {
            continue;
        }
        (migration.apply)(store)?;
        store.record_migration(migration.version, migration.name.to_string());
        tracing::info!(version = migration.version, name = migration.name, "applied migration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_in_ascending_order_exactly_once() {
        let mut store = RelationalStore::new();
        let migrations = vec![
            Migration {
                version: 2,
                name: "second",
                apply: |_| Ok(()),
            },
            Migration {
                version: 1,
                name: "first",
                apply: |_| Ok(()),
            },
        ];
        run_pending(&mut store, &migrations).unwrap();
        assert_eq!(store.schema_version(), 2);
        assert_eq!(store.applied_migration_versions(), vec![1, 2]);

        // Re-running is a no-op: versions are applied exactly once.
        run_pending(&mut store, &migrations).unwrap();
        assert_eq!(store.applied_migration_versions(), vec![1, 2]);
    }
}
