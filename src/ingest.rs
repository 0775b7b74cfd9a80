use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use tracing::info;

use crate::model::{LedgerRow, OrderRecord};

pub const ORDER_NUMBER_COLUMN: &str = "order number";
pub const TRACKING_COLUMN: &str = "tracking";
pub const SOURCE_COLUMN: &str = "file";

const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

#[derive(Debug, Clone, Default)]
pub struct IngestedOrders {
    pub records: Vec<OrderRecord>,
    pub duplicates_dropped: usize,
    pub passthrough_columns: Vec<String>,
}

pub fn load_orders(path: &Path) -> Result<IngestedOrders> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

    let rows = if is_csv(path) {
        read_csv_rows(path)?
    } else {
        read_workbook_rows(path)?
    };

    let orders = orders_from_rows(&source, rows)?;
    info!(
        path = %path.display(),
        rows = orders.records.len(),
        duplicates_dropped = orders.duplicates_dropped,
        "loaded orders"
    );
    Ok(orders)
}

/// Builds order records from a header row followed by data rows. Headers are
/// matched case-insensitively after trimming.
pub fn orders_from_rows(source: &str, rows: Vec<Vec<String>>) -> Result<IngestedOrders> {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        bail!("{source} has no header row");
    };
    let header: Vec<String> = header.iter().map(|name| name.trim().to_lowercase()).collect();

    let position = |column: &str| header.iter().position(|name| name == column);
    let (Some(order_idx), Some(tracking_idx)) =
        (position(ORDER_NUMBER_COLUMN), position(TRACKING_COLUMN))
    else {
        bail!(
            "{source} does not contain the required columns `{ORDER_NUMBER_COLUMN}` and `{TRACKING_COLUMN}` (columns present: {})",
            header.join(", ")
        );
    };
    let source_idx = position(SOURCE_COLUMN);

    let passthrough_columns = header
        .iter()
        .filter(|name| {
            !name.is_empty()
                && ![ORDER_NUMBER_COLUMN, TRACKING_COLUMN, SOURCE_COLUMN].contains(&name.as_str())
        })
        .cloned()
        .collect();

    let cell = |row: &[String], idx: usize| row.get(idx).map(|v| v.trim().to_string()).unwrap_or_default();

    let candidates = rows.filter_map(|row| {
        let row = row.as_slice();
        let order_number = cell(row, order_idx);
        let tracking = cell(row, tracking_idx);
        if order_number.is_empty() && tracking.is_empty() {
            return None;
        }

        let row_source = source_idx
            .map(|idx| cell(row, idx))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| source.to_string());

        Some(OrderRecord {
            source: row_source,
            order_number,
            tracking,
        })
    });

    let (records, duplicates_dropped) = dedup_orders(candidates);

    Ok(IngestedOrders {
        records,
        duplicates_dropped,
        passthrough_columns,
    })
}

/// Turns stored ledger rows back into order records for a re-check.
pub fn orders_from_ledger(rows: Vec<LedgerRow>) -> IngestedOrders {
    let candidates = rows.into_iter().map(|row| OrderRecord {
        source: row.file,
        order_number: row.order_number,
        tracking: row.tracking,
    });
    let (records, duplicates_dropped) = dedup_orders(candidates);

    IngestedOrders {
        records,
        duplicates_dropped,
        passthrough_columns: Vec::new(),
    }
}

fn dedup_orders(candidates: impl Iterator<Item = OrderRecord>) -> (Vec<OrderRecord>, usize) {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut dropped = 0;

    for record in candidates {
        if seen.insert((record.order_number.clone(), record.tracking.clone())) {
            records.push(record);
        } else {
            dropped += 1;
        }
    }

    (records, dropped)
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        rows.push(record.iter().map(ToOwned::to_owned).collect());
    }
    Ok(rows)
}

fn read_workbook_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no worksheets", path.display()))?
        .with_context(|| format!("failed to read first worksheet of {}", path.display()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            (*value as i64).to_string()
        }
        other => other.to_string(),
    }
}

fn is_csv(path: &Path) -> bool {
    has_extension(path, &["csv"])
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Spreadsheet inputs in `dir`, sorted by file name. Office lock files are
/// skipped.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_lock_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("~$"));

        if !is_lock_file && (is_csv(&path) || has_extension(&path, &WORKBOOK_EXTENSIONS)) {
            inputs.push(path);
        }
    }

    inputs.sort();
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tracksync-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("scratch dir should be created");
        dir
    }

    #[test]
    fn headers_are_normalized_and_duplicates_dropped() {
        let orders = orders_from_rows(
            "week1.xlsx",
            rows(&[
                &[" Order Number ", "TRACKING", "Customer"],
                &["US1", "T1", "Ann"],
                &["US1", "T1", "Ann again"],
                &["US2", "T2", "Bo"],
                &["", "", "blank"],
            ]),
        )
        .expect("orders should load");

        assert_eq!(orders.records.len(), 2);
        assert_eq!(orders.duplicates_dropped, 1);
        assert_eq!(orders.passthrough_columns, vec!["customer".to_string()]);
        assert_eq!(
            orders.records[0],
            OrderRecord {
                source: "week1.xlsx".to_string(),
                order_number: "US1".to_string(),
                tracking: "T1".to_string(),
            }
        );
    }

    #[test]
    fn missing_required_columns_is_an_error() {
        let err = orders_from_rows("bad.xlsx", rows(&[&["order", "tracking"], &["1", "T1"]]))
            .expect_err("missing column should fail");
        assert!(err.to_string().contains("required columns"), "unexpected error: {err}");

        assert!(orders_from_rows("empty.csv", Vec::new()).is_err());
    }

    #[test]
    fn file_column_overrides_source() {
        let orders = orders_from_rows(
            "export.csv",
            rows(&[&["File", "order number", "tracking"], &["week1.xlsx", "1", "T1"], &["", "2", "T2"]]),
        )
        .expect("orders should load");

        assert_eq!(orders.records[0].source, "week1.xlsx");
        assert_eq!(orders.records[1].source, "export.csv");
        assert!(orders.passthrough_columns.is_empty());
    }

    #[test]
    fn ledger_rows_become_orders() {
        let orders = orders_from_ledger(vec![
            LedgerRow {
                file: "week1.xlsx".to_string(),
                order_number: "1".to_string(),
                tracking: "T1".to_string(),
                delivery_status: "Delivered".to_string(),
                ..LedgerRow::default()
            },
            LedgerRow {
                file: "week2.xlsx".to_string(),
                order_number: "1".to_string(),
                tracking: "T1".to_string(),
                ..LedgerRow::default()
            },
        ]);

        assert_eq!(orders.records.len(), 1);
        assert_eq!(orders.duplicates_dropped, 1);
        assert_eq!(orders.records[0].source, "week1.xlsx");
    }

    #[test]
    fn csv_inputs_load_and_are_discovered() {
        let dir = scratch_dir("ingest");
        fs::write(dir.join("b.csv"), "order number,tracking\nUS7, T7 \n").expect("fixture written");
        fs::write(dir.join("a.xlsx"), b"").expect("fixture written");
        fs::write(dir.join("~$a.xlsx"), b"").expect("fixture written");
        fs::write(dir.join("notes.txt"), b"ignored").expect("fixture written");

        let inputs = discover_inputs(&dir).expect("discovery should succeed");
        let names: Vec<String> = inputs
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(ToOwned::to_owned))
            .collect();
        assert_eq!(names, vec!["a.xlsx".to_string(), "b.csv".to_string()]);

        let orders = load_orders(&dir.join("b.csv")).expect("csv should load");
        assert_eq!(orders.records[0].tracking, "T7");
        assert_eq!(orders.records[0].source, "b.csv");

        let _ = fs::remove_dir_all(&dir);
    }
}
