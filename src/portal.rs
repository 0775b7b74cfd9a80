use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::browser::Locator;
use crate::util::read_json;

pub const DEFAULT_PORTAL_URL: &str = "https://track.yw56.com.cn/cn/querydel";

/// Element locators of the carrier's bulk query page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub query_input: Locator,
    pub clear_input: Locator,
    pub submit: Locator,
    pub results: Locator,
    pub order_blocks: Locator,
    pub timeout_banner: Locator,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            query_input: Locator::xpath("(//input)[1]"),
            clear_input: Locator::xpath("//i[@class='icon bxweb bx-guanbi clear_icon']"),
            submit: Locator::xpath("//a/img[@src='/static/img/queren.png']"),
            results: Locator::xpath("//div[@class='cx_xx']"),
            order_blocks: Locator::xpath("//div[@class='cx_bt_xx']"),
            timeout_banner: Locator::xpath("//span[contains(.,'请求超时，请重试')]"),
        }
    }
}

pub fn load_selectors(path: Option<&Path>) -> Result<PortalSelectors> {
    let Some(path) = path else {
        return Ok(PortalSelectors::default());
    };

    let selectors: PortalSelectors = read_json(path)?;
    info!(path = %path.display(), "loaded portal selector overrides");
    Ok(selectors)
}
