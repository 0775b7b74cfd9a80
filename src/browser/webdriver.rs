use std::thread;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{Browser, BrowserError, BrowserResult, Locator};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub server_url: String,
    pub headless: bool,
    pub request_timeout: Duration,
}

/// A W3C WebDriver session driving Chrome through a running driver server
/// (chromedriver or a Selenium endpoint).
pub struct WebDriverSession {
    client: Client,
    base_url: String,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    pub fn connect(config: &WebDriverConfig) -> BrowserResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| BrowserError::Transport(err.to_string()))?;
        let base_url = config.server_url.trim_end_matches('/').to_string();

        let mut args = vec!["--window-size=1280,1024"];
        if config.headless {
            args.push("--headless=new");
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-logging"],
                    },
                },
            },
        });

        let value = send(
            &client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(&capabilities),
        )?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        info!(server = %base_url, session_id = %session_id, "webdriver session started");

        Ok(Self {
            client,
            base_url,
            session_id,
            closed: false,
        })
    }

    fn command(&self, method: Method, path: &str, body: Option<&Value>) -> BrowserResult<Value> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.client, method, &url, body)
    }

    fn find_elements(&self, locator: &Locator) -> BrowserResult<Vec<String>> {
        let body = json!({ "using": locator.using.as_webdriver(), "value": locator.value });
        let value = self.command(Method::POST, "/elements", Some(&body))?;

        value
            .as_array()
            .ok_or_else(|| BrowserError::Protocol("find elements did not return a list".into()))?
            .iter()
            .map(|element| {
                element
                    .get(ELEMENT_KEY)
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| BrowserError::Protocol("element reference missing".into()))
            })
            .collect()
    }

    fn first_element(&self, locator: &Locator) -> BrowserResult<String> {
        self.find_elements(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NoSuchElement(locator.to_string()))
    }

    fn element_flag(&self, element: &str, flag: &str) -> BrowserResult<bool> {
        let value = self.command(Method::GET, &format!("/element/{element}/{flag}"), None)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn element_string(&self, element: &str, path: &str) -> BrowserResult<String> {
        let value = self.command(Method::GET, &format!("/element/{element}/{path}"), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn poll_until(
        &self,
        locator: &Locator,
        timeout: Duration,
        condition: &'static str,
        check: impl Fn(&Self) -> BrowserResult<bool>,
    ) -> BrowserResult<()> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match check(self) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(BrowserError::Transport(message)) => {
                    return Err(BrowserError::Transport(message));
                }
                Err(err) => debug!(locator = %locator, error = %err, "condition not met yet"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout {
                    locator: locator.to_string(),
                    condition,
                    timeout_ms: timeout.as_millis(),
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Browser for WebDriverSession {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.command(Method::POST, "/url", Some(&json!({ "url": url })))?;
        info!(url = %url, "navigated");
        Ok(())
    }

    fn wait_present(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        self.poll_until(locator, timeout, "present", |session| {
            Ok(!session.find_elements(locator)?.is_empty())
        })
    }

    fn wait_clickable(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        self.poll_until(locator, timeout, "clickable", |session| {
            let element = session.first_element(locator)?;
            Ok(session.element_flag(&element, "displayed")?
                && session.element_flag(&element, "enabled")?)
        })
    }

    fn read_texts(&mut self, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.find_elements(locator)?
            .iter()
            .map(|element| self.element_string(element, "text"))
            .collect()
    }

    fn read_html(&mut self, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.find_elements(locator)?
            .iter()
            .map(|element| self.element_string(element, "property/outerHTML"))
            .collect()
    }

    fn send_keys(&mut self, locator: &Locator, text: &str) -> BrowserResult<()> {
        let element = self.first_element(locator)?;
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(&json!({ "text": text })),
        )?;
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> BrowserResult<()> {
        let element = self.first_element(locator)?;
        self.command(
            Method::POST,
            &format!("/element/{element}/click"),
            Some(&json!({})),
        )?;
        Ok(())
    }

    fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None)?;
        info!(session_id = %self.session_id, "webdriver session closed");
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(session_id = %self.session_id, error = %err, "failed to close webdriver session");
        }
    }
}

fn send(client: &Client, method: Method, url: &str, body: Option<&Value>) -> BrowserResult<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .send()
        .map_err(|err| BrowserError::Transport(err.to_string()))?;
    let status = response.status();
    let mut payload: Value = response
        .json()
        .map_err(|err| BrowserError::Protocol(format!("invalid response body: {err}")))?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if error == "no such element" {
        return Err(BrowserError::NoSuchElement(message.to_string()));
    }
    Err(BrowserError::Protocol(format!("{status} {error}: {message}")))
}
