use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ExportArgs;
use crate::ledger::{SqliteTableStore, TableStore};
use crate::util::ensure_directory;

pub fn run(args: ExportArgs) -> Result<()> {
    let store = SqliteTableStore::open(&args.store.db_path())?;
    let tables = args.store.tables();
    let table = args.table.table_name(&tables);
    let rows = store.read_table(table)?;

    if let Some(parent) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    for row in &rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write row for tracking {}", row.tracking))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", args.output.display()))?;

    info!(table = %table, rows = rows.len(), path = %args.output.display(), "exported table");
    Ok(())
}
