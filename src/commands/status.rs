use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::ledger::SqliteTableStore;
use crate::model::RunManifest;
use crate::util::{latest_file_with_prefix, read_json};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.db_path();
    let manifest_dir = args.store.manifest_dir();

    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if db_path.exists() {
        let store = SqliteTableStore::open(&db_path)?;
        let counts = store.sheet_counts()?;
        let tables = args.store.tables();
        let rows_in = |table: &str| {
            counts
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, count)| *count)
                .unwrap_or(0)
        };

        info!(
            path = %db_path.display(),
            updated_at = %store.updated_at()?.unwrap_or_default(),
            resolved_table = %tables.resolved,
            resolved_rows = rows_in(&tables.resolved),
            unresolved_table = %tables.unresolved,
            unresolved_rows = rows_in(&tables.unresolved),
            "ledger status"
        );

        for (name, count) in counts
            .iter()
            .filter(|(name, _)| *name != tables.resolved && *name != tables.unresolved)
        {
            info!(table = %name, rows = count, "other table");
        }
    } else {
        warn!(path = %db_path.display(), "ledger database missing");
    }

    match latest_file_with_prefix(&manifest_dir, "run_")? {
        Some(path) => {
            let manifest: RunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                input = %manifest.input.path,
                updated_at = %manifest.updated_at,
                batches = manifest.counts.batches,
                resolved = manifest.counts.resolved_rows,
                unresolved = manifest.counts.unresolved_rows,
                collisions = manifest.counts.merge_collisions,
                "latest run"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no run manifests found"),
    }

    Ok(())
}
