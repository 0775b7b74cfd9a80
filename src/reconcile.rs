use std::collections::HashMap;

use tracing::{info, warn};

use crate::model::{ExtractedFields, LedgerRow, OrderRecord, ScrapedEntry};

/// Status the portal shows when it has no logistics information at all.
pub const NO_LOGISTICS_INFO: &str = "没有查到物流信息";

pub const COUNTRY_PREFIXES: [&str; 1] = ["US"];

#[derive(Debug, Default)]
pub struct Ledger {
    pub rows: Vec<LedgerRow>,
    pub collisions: usize,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub resolved: Vec<LedgerRow>,
    pub unresolved: Vec<LedgerRow>,
}

/// Joins scraped fields onto the input rows. Entries are keyed by the order
/// number the portal shows, which is the tracking value that was queried.
/// A key scraped twice keeps the later value and is counted as a collision.
pub fn merge(batches: &[&[OrderRecord]], extractions: &[Vec<ScrapedEntry>]) -> Ledger {
    let mut by_key: HashMap<&str, &ExtractedFields> = HashMap::new();
    let mut collisions = 0;

    for entry in extractions.iter().flatten() {
        if let Some(previous) = by_key.insert(entry.order_number.as_str(), &entry.fields) {
            collisions += 1;
            warn!(
                key = %entry.order_number,
                replaced_status = %previous.delivery_status,
                status = %entry.fields.delivery_status,
                "key scraped more than once, keeping the later value"
            );
        }
    }

    let rows: Vec<LedgerRow> = batches
        .iter()
        .flat_map(|batch| batch.iter())
        .map(|record| {
            let fields = by_key
                .get(record.tracking.as_str())
                .map(|fields| (*fields).clone())
                .unwrap_or_default();

            LedgerRow {
                file: record.source.clone(),
                order_number: strip_country_prefix(&record.order_number).to_string(),
                delivery_company: fields.delivery_company,
                tracking_number: fields.tracking_number,
                tracking: record.tracking.clone(),
                delivery_status: fields.delivery_status,
                days_in_transport: fields.days_in_transport,
            }
        })
        .collect();

    info!(rows = rows.len(), keys = by_key.len(), collisions, "ledger merged");
    Ledger { rows, collisions }
}

pub fn strip_country_prefix(order_number: &str) -> &str {
    COUNTRY_PREFIXES
        .iter()
        .find_map(|prefix| order_number.strip_prefix(prefix))
        .unwrap_or(order_number)
}

pub fn is_unresolved(row: &LedgerRow) -> bool {
    let status = row.delivery_status.trim();
    status.is_empty() || status == NO_LOGISTICS_INFO
}

pub fn classify(rows: Vec<LedgerRow>) -> Classification {
    let (unresolved, resolved): (Vec<LedgerRow>, Vec<LedgerRow>) =
        rows.into_iter().partition(is_unresolved);

    Classification {
        resolved,
        unresolved,
    }
}
