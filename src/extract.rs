use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};

use crate::model::{ExtractedFields, ScrapedEntry, ScrapedNode, TERMINAL_MARKER};

/// Text rules for the portal's result entries. A rule that finds nothing
/// yields an empty string; none of them fail.
pub struct FieldExtractor {
    day_count: Regex,
    company: Regex,
    last_mile: Regex,
    iso_date: Regex,
    status_entry: Selector,
}

impl FieldExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            day_count: Regex::new(r"[0-9]+").context("failed to compile day count regex")?,
            company: Regex::new(r"Last mile=> (.*?), number")
                .context("failed to compile delivery company regex")?,
            last_mile: Regex::new(r"Last mile=> (.*?), number (\S+)")
                .context("failed to compile last mile regex")?,
            iso_date: Regex::new(r"[0-9]{4}-[0-9]{2}-[0-9]{2}")
                .context("failed to compile date regex")?,
            status_entry: Selector::parse("li")
                .map_err(|err| anyhow!("failed to parse status entry selector: {err:?}"))?,
        })
    }

    pub fn extract_day_count(&self, text: &str) -> String {
        self.day_count
            .find(text)
            .map(|found| found.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn extract_company(&self, raw: &str) -> String {
        self.company
            .captures(raw)
            .and_then(|captures| captures.get(1))
            .map(|company| company.as_str().to_string())
            .unwrap_or_default()
    }

    /// Reads `(tracking, company)` from the last status entry of a result
    /// node. Both are empty when the entry carries no last-mile annotation.
    pub fn extract_last_mile(&self, node_html: &str) -> (String, String) {
        let fragment = Html::parse_fragment(node_html);
        let detail = match fragment.select(&self.status_entry).last() {
            Some(entry) => collapse_whitespace(entry.text()),
            None => collapse_whitespace(fragment.root_element().text()),
        };

        match self.last_mile.captures(&detail) {
            Some(captures) => {
                let company = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let tracking = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
                (format!("{tracking}{TERMINAL_MARKER}"), company.to_string())
            }
            None => (String::new(), String::new()),
        }
    }

    /// Day count for the ledger. A `YYYY-MM-DD` date in the text is turned
    /// into elapsed days; otherwise the first number in the text is used.
    pub fn days_in_transport(&self, days_text: &str, today: NaiveDate) -> String {
        match self.iso_date.find(days_text) {
            Some(date) => days_since(date.as_str(), today)
                .map(|days| days.max(0).to_string())
                .unwrap_or_default(),
            None => self.extract_day_count(days_text),
        }
    }

    pub fn extract_entry(&self, node: &ScrapedNode, today: NaiveDate) -> ScrapedEntry {
        let last_mile = node
            .detail_html
            .as_deref()
            .map(|html| self.extract_last_mile(html))
            .unwrap_or_default();

        let mut delivery_company = self.extract_company(&node.status_text);
        if delivery_company.is_empty() {
            delivery_company = last_mile.1;
        }

        let tracking_number = if segment(&node.order_block, 1).is_none() && !last_mile.0.is_empty()
        {
            last_mile.0
        } else {
            extract_tracking_suffix(&node.order_block)
        };

        ScrapedEntry {
            order_number: order_number_segment(&node.order_block).to_string(),
            fields: ExtractedFields {
                delivery_status: node.status_text.clone(),
                tracking_number,
                days_in_transport: self
                    .days_in_transport(&extract_days_text(&node.order_block), today),
                delivery_company,
            },
        }
    }
}

fn segment(raw: &str, index: usize) -> Option<&str> {
    raw.split('\n').nth(index)
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn order_number_segment(raw: &str) -> &str {
    segment(raw, 0).unwrap_or_default()
}

pub fn extract_tracking_suffix(raw: &str) -> String {
    let suffix = segment(raw, 1).unwrap_or(raw);
    format!("{suffix}{TERMINAL_MARKER}")
}

pub fn extract_days_text(raw: &str) -> String {
    segment(raw, 2).unwrap_or_default().to_string()
}

/// Whole days from `date_text` (`YYYY-MM-DD`) to `today`, the local date of
/// the run. `None` for empty or unparseable input.
pub fn days_since(date_text: &str, today: NaiveDate) -> Option<i64> {
    let trimmed = date_text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
    Some((today - date).num_days())
}
