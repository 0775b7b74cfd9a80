use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::TableStore;
use crate::model::LedgerRow;
use crate::util::{ensure_directory, now_utc_string};

const DB_SCHEMA_VERSION: &str = "0.1.0";

/// Ledger workbook kept in SQLite: one ordered set of rows per sheet name.
pub struct SqliteTableStore {
    connection: Connection,
}

impl SqliteTableStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;

        Self::from_connection(connection)
    }

    pub fn from_connection(connection: Connection) -> Result<Self> {
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Row count per sheet, by sheet name.
    pub fn sheet_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut statement = self.connection.prepare(
            "SELECT sheet, COUNT(*) FROM sheet_rows GROUP BY sheet ORDER BY sheet ASC",
        )?;
        let counts = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;
        Ok(counts)
    }

    pub fn updated_at(&self) -> Result<Option<String>> {
        let mut statement = self
            .connection
            .prepare("SELECT value FROM metadata WHERE key = 'db_updated_at'")?;
        let mut rows = statement.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sheet_rows (
              sheet TEXT NOT NULL,
              position INTEGER NOT NULL,
              file TEXT NOT NULL DEFAULT '',
              order_number TEXT NOT NULL DEFAULT '',
              delivery_company TEXT NOT NULL DEFAULT '',
              tracking_number TEXT NOT NULL DEFAULT '',
              tracking TEXT NOT NULL,
              delivery_status TEXT NOT NULL DEFAULT '',
              days_in_transport TEXT NOT NULL DEFAULT '',
              PRIMARY KEY (sheet, position)
            );
            ",
        )
        .context("failed to initialize ledger schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

impl TableStore for SqliteTableStore {
    fn read_table(&self, table: &str) -> Result<Vec<LedgerRow>> {
        let mut statement = self.connection.prepare(
            "
            SELECT file, order_number, delivery_company, tracking_number, tracking,
                   delivery_status, days_in_transport
            FROM sheet_rows
            WHERE sheet = ?1
            ORDER BY position ASC
            ",
        )?;

        let rows = statement
            .query_map([table], |row| {
                Ok(LedgerRow {
                    file: row.get(0)?,
                    order_number: row.get(1)?,
                    delivery_company: row.get(2)?,
                    tracking_number: row.get(3)?,
                    tracking: row.get(4)?,
                    delivery_status: row.get(5)?,
                    days_in_transport: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<LedgerRow>>>()
            .with_context(|| format!("failed to read table {table}"))?;

        Ok(rows)
    }

    fn overwrite_table(&mut self, table: &str, rows: &[LedgerRow]) -> Result<()> {
        let tx = self.connection.transaction()?;
        tx.execute("DELETE FROM sheet_rows WHERE sheet = ?1", [table])?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO sheet_rows(
                  sheet, position, file, order_number, delivery_company, tracking_number,
                  tracking, delivery_status, days_in_transport
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;

            for (position, row) in rows.iter().enumerate() {
                statement.execute(params![
                    table,
                    position as i64,
                    row.file,
                    row.order_number,
                    row.delivery_company,
                    row.tracking_number,
                    row.tracking,
                    row.delivery_status,
                    row.days_in_transport,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [now_utc_string()],
        )?;
        tx.commit()
            .with_context(|| format!("failed to overwrite table {table}"))?;

        Ok(())
    }
}
