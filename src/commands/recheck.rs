use anyhow::Result;
use tracing::info;

use super::run::execute;
use crate::cli::RecheckArgs;
use crate::ingest::orders_from_ledger;
use crate::ledger::{SqliteTableStore, TableStore};
use crate::model::RunInput;

pub fn run(args: RecheckArgs) -> Result<()> {
    let db_path = args.store.db_path();
    let mut store = SqliteTableStore::open(&db_path)?;

    let tables = args.store.tables();
    let table = args.table.table_name(&tables).to_string();
    let orders = orders_from_ledger(store.read_table(&table)?);

    info!(
        table = %table,
        rows = orders.records.len(),
        duplicates_dropped = orders.duplicates_dropped,
        "re-checking stored rows"
    );

    let input = RunInput {
        path: format!("table:{table}"),
        sha256: None,
        passthrough_columns: Vec::new(),
    };

    execute(1, input, &orders, &mut store, &args.store, &args.portal)
}
