use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserError};
use crate::extract::{FieldExtractor, order_number_segment};
use crate::model::{OrderRecord, ScrapedEntry, ScrapedNode};
use crate::portal::PortalSelectors;

pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_SUBMIT_ATTEMPTS: usize = 10;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query submission failed after {attempts} attempts")]
    SubmissionFailed { attempts: usize },
    #[error("portal returned {statuses} status entries for {orders} order entries")]
    Misaligned { statuses: usize, orders: usize },
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub wait_timeout: Duration,
    pub max_submit_attempts: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            max_submit_attempts: DEFAULT_MAX_SUBMIT_ATTEMPTS,
        }
    }
}

/// Runs one batch through the portal's bulk query form.
pub struct QueryDriver {
    selectors: PortalSelectors,
    settings: QuerySettings,
    extractor: FieldExtractor,
}

impl QueryDriver {
    pub fn new(selectors: PortalSelectors, settings: QuerySettings, extractor: FieldExtractor) -> Self {
        Self {
            selectors,
            settings,
            extractor,
        }
    }

    /// Queries every tracking value of `batch` and returns one entry per
    /// result that carries an order number, in page order.
    pub fn run_batch<B: Browser>(
        &self,
        browser: &mut B,
        batch: &[OrderRecord],
        today: NaiveDate,
    ) -> Result<Vec<ScrapedEntry>, QueryError> {
        let timeout = self.settings.wait_timeout;
        browser.wait_present(&self.selectors.query_input, timeout)?;

        // The first query of a session has nothing to clear.
        if let Err(err) = browser.click(&self.selectors.clear_input) {
            debug!(error = %err, "query input not cleared");
        }

        for record in batch {
            browser.send_keys(&self.selectors.query_input, &format!("{} ", record.tracking))?;
        }

        self.submit(browser)?;

        if !browser.read_texts(&self.selectors.timeout_banner)?.is_empty() {
            info!("portal reported a request timeout, resubmitting");
            self.submit(browser)?;
        }

        browser.wait_present(&self.selectors.results, timeout)?;
        let nodes = self.scrape(browser)?;

        let entries: Vec<ScrapedEntry> = nodes
            .iter()
            .map(|node| self.extractor.extract_entry(node, today))
            .collect();

        info!(queried = batch.len(), entries = entries.len(), "batch scraped");
        Ok(entries)
    }

    fn submit<B: Browser>(&self, browser: &mut B) -> Result<(), QueryError> {
        let timeout = self.settings.wait_timeout;
        let attempts = self.settings.max_submit_attempts.max(1);

        for attempt in 1..=attempts {
            let outcome = browser
                .wait_clickable(&self.selectors.submit, timeout)
                .and_then(|()| browser.click(&self.selectors.submit))
                .and_then(|()| browser.wait_present(&self.selectors.results, timeout));

            match outcome {
                Ok(()) => {
                    debug!(attempt, "query submitted");
                    return Ok(());
                }
                Err(err) => warn!(attempt, max_attempts = attempts, error = %err, "query submission failed"),
            }
        }

        Err(QueryError::SubmissionFailed { attempts })
    }

    /// Pairs status, markup and order block by position, then drops the
    /// entries whose order block carries no order number.
    fn scrape<B: Browser>(&self, browser: &mut B) -> Result<Vec<ScrapedNode>, QueryError> {
        let statuses = browser.read_texts(&self.selectors.results)?;
        let mut html = browser.read_html(&self.selectors.results)?;
        let blocks = browser.read_texts(&self.selectors.order_blocks)?;

        if statuses.len() != blocks.len() {
            return Err(QueryError::Misaligned {
                statuses: statuses.len(),
                orders: blocks.len(),
            });
        }

        if html.len() != statuses.len() {
            debug!(statuses = statuses.len(), html = html.len(), "status markup not aligned, ignoring it");
            html.clear();
        }
        let mut html = html.into_iter();

        let nodes: Vec<ScrapedNode> = statuses
            .into_iter()
            .zip(blocks)
            .map(|(status_text, order_block)| ScrapedNode {
                status_text,
                order_block,
                detail_html: html.next().filter(|markup| !markup.is_empty()),
            })
            .filter(|node| !order_number_segment(&node.order_block).trim().is_empty())
            .collect();

        Ok(nodes)
    }
}
