use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::model::LedgerRow;
use crate::reconcile::Classification;

mod sqlite;

pub use sqlite::SqliteTableStore;

pub const DEFAULT_RESOLVED_TABLE: &str = "Good Tracking";
pub const DEFAULT_UNRESOLVED_TABLE: &str = "Backlog";

/// Whole-table access to the ledger workbook. Writes replace the table.
pub trait TableStore {
    fn read_table(&self, table: &str) -> Result<Vec<LedgerRow>>;

    fn overwrite_table(&mut self, table: &str, rows: &[LedgerRow]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct LedgerTables {
    pub resolved: String,
    pub unresolved: String,
}

impl Default for LedgerTables {
    fn default() -> Self {
        Self {
            resolved: DEFAULT_RESOLVED_TABLE.to_string(),
            unresolved: DEFAULT_UNRESOLVED_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub resolved_table_rows: usize,
    pub unresolved_table_rows: usize,
    pub evicted_from_resolved: usize,
    pub evicted_from_unresolved: usize,
}

/// Keeps the first row seen for every tracking value.
pub fn dedup_by_tracking(rows: impl IntoIterator<Item = LedgerRow>) -> Vec<LedgerRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.tracking.clone()))
        .collect()
}

/// Merges `new_rows` into `table`, new rows winning on a shared tracking
/// value, and writes the result back. Returns the table's new row count.
pub fn upsert<S: TableStore + ?Sized>(store: &mut S, new_rows: &[LedgerRow], table: &str) -> Result<usize> {
    let existing = store.read_table(table)?;
    let existing_count = existing.len();

    let merged = dedup_by_tracking(new_rows.iter().cloned().chain(existing));
    store.overwrite_table(table, &merged)?;

    info!(
        table = %table,
        new_rows = new_rows.len(),
        existing_rows = existing_count,
        table_rows = merged.len(),
        "table upserted"
    );
    Ok(merged.len())
}

/// Removes every row of `table` whose tracking value is in `trackings`.
pub fn evict<S: TableStore + ?Sized>(store: &mut S, trackings: &HashSet<&str>, table: &str) -> Result<usize> {
    let existing = store.read_table(table)?;
    let before = existing.len();

    let kept: Vec<LedgerRow> = existing
        .into_iter()
        .filter(|row| !trackings.contains(row.tracking.as_str()))
        .collect();
    let evicted = before - kept.len();

    if evicted > 0 {
        store.overwrite_table(table, &kept)?;
        info!(table = %table, evicted, "moved rows out of table");
    }
    Ok(evicted)
}

/// Writes a run's classification so that every tracking value ends up in
/// exactly one of the two tables.
pub fn sync_ledger<S: TableStore + ?Sized>(
    store: &mut S,
    classification: &Classification,
    tables: &LedgerTables,
) -> Result<SyncReport> {
    let resolved_keys: HashSet<&str> = classification
        .resolved
        .iter()
        .map(|row| row.tracking.as_str())
        .collect();
    let unresolved_keys: HashSet<&str> = classification
        .unresolved
        .iter()
        .map(|row| row.tracking.as_str())
        .collect();

    let mut report = SyncReport {
        resolved_table_rows: upsert(store, &classification.resolved, &tables.resolved)?,
        unresolved_table_rows: upsert(store, &classification.unresolved, &tables.unresolved)?,
        ..SyncReport::default()
    };

    report.evicted_from_unresolved = evict(store, &resolved_keys, &tables.unresolved)?;
    report.evicted_from_resolved = evict(store, &unresolved_keys, &tables.resolved)?;
    report.unresolved_table_rows -= report.evicted_from_unresolved;
    report.resolved_table_rows -= report.evicted_from_resolved;

    Ok(report)
}
