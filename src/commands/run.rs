use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::browser::WebDriverSession;
use crate::cli::{PortalArgs, RunArgs, StoreArgs};
use crate::extract::FieldExtractor;
use crate::ingest::{IngestedOrders, discover_inputs, load_orders};
use crate::ledger::SqliteTableStore;
use crate::model::{RunCounts, RunInput, RunManifest, RunSettings};
use crate::pipeline::{PipelineSettings, run_pipeline};
use crate::portal::load_selectors;
use crate::query::QueryDriver;
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: RunArgs) -> Result<()> {
    let mut inputs = args.inputs.clone();
    if let Some(dir) = &args.input_dir {
        inputs.extend(discover_inputs(dir)?);
    }
    if inputs.is_empty() {
        bail!("no input spreadsheets given; pass --input or --input-dir");
    }

    let db_path = args.store.db_path();
    let mut store = SqliteTableStore::open(&db_path)?;
    info!(inputs = inputs.len(), db_path = %db_path.display(), "starting run");

    for (idx, path) in inputs.iter().enumerate() {
        let orders = load_orders(path)?;
        let input = RunInput {
            path: path.display().to_string(),
            sha256: Some(sha256_file(path)?),
            passthrough_columns: orders.passthrough_columns.clone(),
        };

        execute(idx + 1, input, &orders, &mut store, &args.store, &args.portal)?;
    }

    info!(inputs = inputs.len(), "run completed");
    Ok(())
}

/// Queries `orders` through a fresh browser session, syncs the ledger and
/// writes the run manifest.
pub(crate) fn execute(
    seq: usize,
    input: RunInput,
    orders: &IngestedOrders,
    store: &mut SqliteTableStore,
    store_args: &StoreArgs,
    portal: &PortalArgs,
) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}-{seq:03}", utc_compact_string(started_ts));

    if orders.records.is_empty() {
        warn!(input = %input.path, "no order rows to query, skipping");
        return Ok(());
    }

    let selectors = load_selectors(portal.selectors.as_deref())?;
    let driver = QueryDriver::new(selectors, portal.query_settings(), FieldExtractor::new()?);
    let settings = PipelineSettings {
        portal_url: portal.portal_url.clone(),
        batch_size: portal.batch_size(),
        tables: store_args.tables(),
    };

    info!(run_id = %run_id, input = %input.path, rows = orders.records.len(), "starting pipeline");

    let mut session = WebDriverSession::connect(&portal.webdriver_config())
        .with_context(|| format!("failed to start a browser session at {}", portal.webdriver_url))?;
    let report = run_pipeline(&mut session, store, &driver, &orders.records, &settings)?;

    let mut warnings = Vec::new();
    if report.merge_collisions > 0 {
        warnings.push(format!(
            "{} scraped keys appeared more than once; later values were kept",
            report.merge_collisions
        ));
    }

    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        db_path: store_args.db_path().display().to_string(),
        input,
        settings: RunSettings {
            portal_url: settings.portal_url.clone(),
            webdriver_url: portal.webdriver_url.clone(),
            batch_size: settings.batch_size,
            wait_timeout_ms: portal.wait_timeout_ms,
            max_submit_attempts: portal.query_settings().max_submit_attempts,
            resolved_table: settings.tables.resolved.clone(),
            unresolved_table: settings.tables.unresolved.clone(),
        },
        counts: RunCounts {
            input_rows: orders.records.len(),
            duplicates_dropped: orders.duplicates_dropped,
            batches: report.batches,
            scraped_entries: report.scraped_entries,
            ledger_rows: report.ledger_rows,
            resolved_rows: report.resolved_rows,
            unresolved_rows: report.unresolved_rows,
            merge_collisions: report.merge_collisions,
            resolved_table_rows: report.sync.resolved_table_rows,
            unresolved_table_rows: report.sync.unresolved_table_rows,
        },
        warnings,
    };

    let manifest_path = manifest_path(store_args, started_ts, seq);
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote run manifest");
    info!(
        run_id = %run_id,
        resolved = report.resolved_rows,
        unresolved = report.unresolved_rows,
        "pipeline completed"
    );

    Ok(())
}

fn manifest_path(store_args: &StoreArgs, started_ts: chrono::DateTime<Utc>, seq: usize) -> PathBuf {
    store_args
        .manifest_dir()
        .join(format!("run_{}_{seq:03}.json", utc_compact_string(started_ts)))
}
