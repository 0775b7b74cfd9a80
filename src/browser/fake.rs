use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::{Browser, BrowserError, BrowserResult, Locator};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub html: String,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            html: String::new(),
        }
    }
}

/// Elements keyed by locator value. Applying a page replaces only the keys it
/// names.
pub type FakePage = HashMap<String, Vec<FakeElement>>;

/// Scripted stand-in for a browser session. Every successful click on
/// `submit` applies the next queued page to the DOM.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pub dom: FakePage,
    pub submit: String,
    pub on_submit: VecDeque<FakePage>,
    pub failing_submits: usize,
    pub visited: Vec<String>,
    pub typed: Vec<String>,
    pub clicks: Vec<String>,
    pub closed: bool,
}

impl FakeBrowser {
    pub fn new(submit: &Locator) -> Self {
        Self {
            submit: submit.value.clone(),
            ..Self::default()
        }
    }

    pub fn with_element(mut self, locator: &Locator, element: FakeElement) -> Self {
        self.dom.entry(locator.value.clone()).or_default().push(element);
        self
    }

    pub fn queue_page(&mut self, page: FakePage) {
        self.on_submit.push_back(page);
    }

    fn present(&self, locator: &Locator) -> bool {
        self.dom
            .get(&locator.value)
            .is_some_and(|elements| !elements.is_empty())
    }

    fn wait(&self, locator: &Locator, timeout: Duration, condition: &'static str) -> BrowserResult<()> {
        if self.present(locator) {
            return Ok(());
        }
        Err(BrowserError::Timeout {
            locator: locator.to_string(),
            condition,
            timeout_ms: timeout.as_millis(),
        })
    }

    fn read(&self, locator: &Locator, field: fn(&FakeElement) -> String) -> Vec<String> {
        self.dom
            .get(&locator.value)
            .map(|elements| elements.iter().map(field).collect())
            .unwrap_or_default()
    }
}

impl Browser for FakeBrowser {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.visited.push(url.to_string());
        Ok(())
    }

    fn wait_present(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        self.wait(locator, timeout, "present")
    }

    fn wait_clickable(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        self.wait(locator, timeout, "clickable")
    }

    fn read_texts(&mut self, locator: &Locator) -> BrowserResult<Vec<String>> {
        Ok(self.read(locator, |element| element.text.clone()))
    }

    fn read_html(&mut self, locator: &Locator) -> BrowserResult<Vec<String>> {
        Ok(self.read(locator, |element| element.html.clone()))
    }

    fn send_keys(&mut self, locator: &Locator, text: &str) -> BrowserResult<()> {
        if !self.present(locator) {
            return Err(BrowserError::NoSuchElement(locator.to_string()));
        }
        self.typed.push(text.to_string());
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> BrowserResult<()> {
        if !self.present(locator) {
            return Err(BrowserError::NoSuchElement(locator.to_string()));
        }
        self.clicks.push(locator.value.clone());

        if locator.value == self.submit {
            if self.failing_submits > 0 {
                self.failing_submits -= 1;
                return Err(BrowserError::Protocol("element click intercepted".into()));
            }
            if let Some(page) = self.on_submit.pop_front() {
                self.dom.extend(page);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> BrowserResult<()> {
        self.closed = true;
        Ok(())
    }
}
