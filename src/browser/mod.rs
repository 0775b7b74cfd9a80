use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod webdriver;
#[cfg(test)]
pub mod fake;

pub use webdriver::{WebDriverConfig, WebDriverSession};

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {timeout_ms} ms waiting for {locator} to be {condition}")]
    Timeout {
        locator: String,
        condition: &'static str,
        timeout_ms: u128,
    },
    #[error("no element matches {0}")]
    NoSuchElement(String),
    #[error("webdriver transport error: {0}")]
    Transport(String),
    #[error("webdriver protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Xpath,
    Css,
}

impl Strategy {
    pub fn as_webdriver(self) -> &'static str {
        match self {
            Self::Xpath => "xpath",
            Self::Css => "css selector",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub using: Strategy,
    pub value: String,
}

impl Locator {
    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            using: Strategy::Xpath,
            value: value.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.using.as_webdriver(), self.value)
    }
}

/// What the pipeline needs from a browser. Every wait is bounded by the
/// timeout it is given; reads return an empty list when nothing matches.
pub trait Browser {
    fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    fn wait_present(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()>;

    fn wait_clickable(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()>;

    fn read_texts(&mut self, locator: &Locator) -> BrowserResult<Vec<String>>;

    /// Outer HTML of every matching element, in document order.
    fn read_html(&mut self, locator: &Locator) -> BrowserResult<Vec<String>>;

    fn send_keys(&mut self, locator: &Locator, text: &str) -> BrowserResult<()>;

    fn click(&mut self, locator: &Locator) -> BrowserResult<()>;

    fn close(&mut self) -> BrowserResult<()>;
}
