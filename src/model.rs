use serde::{Deserialize, Serialize};

/// Appended to every tracking value taken from the portal so it cannot be
/// confused with the tracking value that was typed into the query form.
pub const TERMINAL_MARKER: char = 'A';

/// One input row. `tracking` is the merge key back into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub source: String,
    pub order_number: String,
    pub tracking: String,
}

/// Raw text captured from one result entry of the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedNode {
    pub status_text: String,
    pub order_block: String,
    pub detail_html: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub delivery_status: String,
    pub tracking_number: String,
    pub days_in_transport: String,
    pub delivery_company: String,
}

/// A scraped result entry keyed by the order number shown on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedEntry {
    pub order_number: String,
    pub fields: ExtractedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "File", default)]
    pub file: String,
    #[serde(rename = "order number", default)]
    pub order_number: String,
    #[serde(rename = "delivery company", default)]
    pub delivery_company: String,
    #[serde(default)]
    pub tracking_number: String,
    pub tracking: String,
    #[serde(default)]
    pub delivery_status: String,
    #[serde(default)]
    pub days_in_transport: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInput {
    pub path: String,
    pub sha256: Option<String>,
    pub passthrough_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub portal_url: String,
    pub webdriver_url: String,
    pub batch_size: usize,
    pub wait_timeout_ms: u64,
    pub max_submit_attempts: usize,
    pub resolved_table: String,
    pub unresolved_table: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub input_rows: usize,
    pub duplicates_dropped: usize,
    pub batches: usize,
    pub scraped_entries: usize,
    pub ledger_rows: usize,
    pub resolved_rows: usize,
    pub unresolved_rows: usize,
    pub merge_collisions: usize,
    pub resolved_table_rows: usize,
    pub unresolved_table_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub db_path: String,
    pub input: RunInput,
    pub settings: RunSettings,
    pub counts: RunCounts,
    pub warnings: Vec<String>,
}
