use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use crate::batch::plan_batches;
use crate::browser::Browser;
use crate::ledger::{LedgerTables, SyncReport, TableStore, sync_ledger};
use crate::model::OrderRecord;
use crate::query::QueryDriver;
use crate::reconcile::{classify, merge};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub portal_url: String,
    pub batch_size: usize,
    pub tables: LedgerTables,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub batches: usize,
    pub scraped_entries: usize,
    pub ledger_rows: usize,
    pub resolved_rows: usize,
    pub unresolved_rows: usize,
    pub merge_collisions: usize,
    pub sync: SyncReport,
}

/// Queries every record, reconciles the results and syncs both ledger
/// tables. The browser session is closed on every exit path.
pub fn run_pipeline<B, S>(
    browser: &mut B,
    store: &mut S,
    driver: &QueryDriver,
    records: &[OrderRecord],
    settings: &PipelineSettings,
) -> Result<PipelineReport>
where
    B: Browser,
    S: TableStore + ?Sized,
{
    let outcome = drive(browser, store, driver, records, settings);

    if let Err(err) = browser.close() {
        warn!(error = %err, "failed to close browser session");
    }

    outcome
}

fn drive<B, S>(
    browser: &mut B,
    store: &mut S,
    driver: &QueryDriver,
    records: &[OrderRecord],
    settings: &PipelineSettings,
) -> Result<PipelineReport>
where
    B: Browser,
    S: TableStore + ?Sized,
{
    let batches = plan_batches(records, settings.batch_size);
    info!(rows = records.len(), batches = batches.len(), "planned batches");

    browser
        .navigate(&settings.portal_url)
        .with_context(|| format!("failed to open {}", settings.portal_url))?;

    let today = Local::now().date_naive();
    let mut extractions = Vec::with_capacity(batches.len());

    for (idx, batch) in batches.iter().enumerate() {
        info!(batch = idx + 1, of = batches.len(), rows = batch.len(), "querying batch");
        let entries = driver
            .run_batch(browser, batch, today)
            .with_context(|| format!("batch {} of {} failed", idx + 1, batches.len()))?;
        extractions.push(entries);
    }

    let ledger = merge(&batches, &extractions);
    let ledger_rows = ledger.rows.len();
    let classification = classify(ledger.rows);
    info!(
        resolved = classification.resolved.len(),
        unresolved = classification.unresolved.len(),
        "ledger classified"
    );

    let sync = sync_ledger(store, &classification, &settings.tables)
        .context("failed to sync ledger tables")?;
    info!(
        resolved_table_rows = sync.resolved_table_rows,
        unresolved_table_rows = sync.unresolved_table_rows,
        evicted_from_resolved = sync.evicted_from_resolved,
        evicted_from_unresolved = sync.evicted_from_unresolved,
        "ledger synced"
    );

    Ok(PipelineReport {
        batches: batches.len(),
        scraped_entries: extractions.iter().map(Vec::len).sum(),
        ledger_rows,
        resolved_rows: classification.resolved.len(),
        unresolved_rows: classification.unresolved.len(),
        merge_collisions: ledger.collisions,
        sync,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rusqlite::Connection;

    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeElement, FakePage};
    use crate::extract::FieldExtractor;
    use crate::ledger::SqliteTableStore;
    use crate::portal::PortalSelectors;
    use crate::query::{QueryError, QuerySettings};
    use crate::reconcile::NO_LOGISTICS_INFO;

    const PORTAL: &str = "https://portal.test/query";

    fn store() -> SqliteTableStore {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        SqliteTableStore::from_connection(connection).expect("schema should initialize")
    }

    fn driver(selectors: &PortalSelectors) -> QueryDriver {
        QueryDriver::new(
            selectors.clone(),
            QuerySettings {
                wait_timeout: Duration::from_millis(10),
                max_submit_attempts: 3,
            },
            FieldExtractor::new().expect("extraction rules should compile"),
        )
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            portal_url: PORTAL.to_string(),
            batch_size: 29,
            tables: LedgerTables::default(),
        }
    }

    fn records(count: usize) -> Vec<OrderRecord> {
        (0..count)
            .map(|idx| OrderRecord {
                source: "week1.xlsx".to_string(),
                order_number: format!("US{idx}"),
                tracking: format!("T{idx}"),
            })
            .collect()
    }

    /// Every even tracking is delivered, every odd one has no information.
    fn page_for(selectors: &PortalSelectors, batch: &[OrderRecord]) -> FakePage {
        let status = |idx: usize| {
            if idx % 2 == 0 {
                "Delivered Last mile=> USPS, number 94".to_string()
            } else {
                NO_LOGISTICS_INFO.to_string()
            }
        };

        let mut page = FakePage::new();
        page.insert(
            selectors.results.value.clone(),
            batch
                .iter()
                .map(|record| {
                    let idx: usize = record.tracking[1..].parse().expect("numeric test tracking");
                    FakeElement::text(&status(idx))
                })
                .collect(),
        );
        page.insert(
            selectors.order_blocks.value.clone(),
            batch
                .iter()
                .map(|record| FakeElement::text(&format!("{}\n{}X", record.tracking, record.tracking)))
                .collect(),
        );
        page
    }

    fn portal(selectors: &PortalSelectors) -> FakeBrowser {
        FakeBrowser::new(&selectors.submit)
            .with_element(&selectors.query_input, FakeElement::text(""))
            .with_element(&selectors.submit, FakeElement::text(""))
    }

    #[test]
    fn pipeline_syncs_both_tables_and_closes_session() {
        let selectors = PortalSelectors::default();
        let input = records(35);
        let mut browser = portal(&selectors);
        for batch in input.chunks(29) {
            browser.queue_page(page_for(&selectors, batch));
        }
        let mut store = store();

        let report = run_pipeline(&mut browser, &mut store, &driver(&selectors), &input, &settings())
            .expect("pipeline should succeed");

        assert_eq!(report.batches, 2);
        assert_eq!(report.scraped_entries, 35);
        assert_eq!(report.ledger_rows, 35);
        assert_eq!(report.resolved_rows, 18);
        assert_eq!(report.unresolved_rows, 17);
        assert_eq!(report.merge_collisions, 0);
        assert!(browser.closed);
        assert_eq!(browser.visited, vec![PORTAL.to_string()]);

        let tables = LedgerTables::default();
        let resolved = store.read_table(&tables.resolved).expect("read should succeed");
        let unresolved = store.read_table(&tables.unresolved).expect("read should succeed");
        assert_eq!(resolved.len(), 18);
        assert_eq!(unresolved.len(), 17);
        assert_eq!(resolved[0].order_number, "0");
        assert_eq!(resolved[0].tracking_number, "T0XA");
        assert_eq!(resolved[0].delivery_company, "USPS");
        assert_eq!(resolved[0].file, "week1.xlsx");
    }

    #[test]
    fn submission_failure_aborts_without_writes_and_closes_session() {
        let selectors = PortalSelectors::default();
        let input = records(3);
        let mut browser = portal(&selectors);
        browser.failing_submits = 3;
        browser.queue_page(page_for(&selectors, &input));
        let mut store = store();

        let err = run_pipeline(&mut browser, &mut store, &driver(&selectors), &input, &settings())
            .expect_err("pipeline should abort");

        assert!(matches!(
            err.downcast_ref::<QueryError>(),
            Some(QueryError::SubmissionFailed { attempts: 3 })
        ));
        assert!(browser.closed);
        assert!(store.sheet_counts().expect("counts should read").is_empty());
    }

    #[test]
    fn blank_status_entry_lands_in_backlog() {
        let selectors = PortalSelectors::default();
        let tables = LedgerTables::default();
        let input = records(3);
        let mut browser = portal(&selectors);
        let mut page = page_for(&selectors, &input);
        page.insert(
            selectors.results.value.clone(),
            vec![
                FakeElement::text("Delivered"),
                FakeElement::text(""),
                FakeElement::text("Delivered"),
            ],
        );
        browser.queue_page(page);
        let mut store = store();

        let report = run_pipeline(&mut browser, &mut store, &driver(&selectors), &input, &settings())
            .expect("pipeline should succeed");

        assert_eq!(report.scraped_entries, 3);
        assert_eq!(report.resolved_rows, 2);
        assert_eq!(report.unresolved_rows, 1);

        let backlog = store.read_table(&tables.unresolved).expect("read should succeed");
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].tracking, "T1");
        assert_eq!(backlog[0].delivery_status, "");
        assert_eq!(backlog[0].tracking_number, "T1XA");
    }

    #[test]
    fn recheck_moves_rows_out_of_backlog() {
        let selectors = PortalSelectors::default();
        let tables = LedgerTables::default();
        let mut store = store();

        let mut first = portal(&selectors);
        let input = records(2);
        first.queue_page(page_for(&selectors, &input));
        run_pipeline(&mut first, &mut store, &driver(&selectors), &input, &settings())
            .expect("first run should succeed");
        assert_eq!(store.read_table(&tables.unresolved).expect("read").len(), 1);

        let mut second = portal(&selectors);
        let mut delivered = page_for(&selectors, &input[1..]);
        delivered.insert(
            selectors.results.value.clone(),
            vec![FakeElement::text("Delivered")],
        );
        second.queue_page(delivered);
        run_pipeline(&mut second, &mut store, &driver(&selectors), &input[1..], &settings())
            .expect("recheck should succeed");

        assert!(store.read_table(&tables.unresolved).expect("read").is_empty());
        let resolved = store.read_table(&tables.resolved).expect("read");
        let keys: Vec<&str> = resolved.iter().map(|row| row.tracking.as_str()).collect();
        assert_eq!(keys, vec!["T1", "T0"]);
    }
}
