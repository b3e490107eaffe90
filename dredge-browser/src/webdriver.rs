//! `fantoccini`-backed [`Session`] implementation.

use crate::session::{Lookup, Selector, Session, SessionError, SessionResult};
use async_trait::async_trait;
use dredge_config::BrowserConfig;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use webdriver::capabilities::Capabilities;

/// A live WebDriver session (chromedriver/geckodriver endpoint).
///
/// Exclusively owned by the scraper controller for its lifetime; dropping
/// it without [`close`](WebDriverSession::close) leaves the browser to the
/// driver service's own cleanup.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Connect to a running WebDriver service.
    pub async fn connect(config: &BrowserConfig) -> SessionResult<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();

        let mut args = vec!["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];
        if config.headless {
            args.push("--headless");
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| SessionError::Fatal(format!("webdriver connect: {e}")))?;

        info!(url = %config.webdriver_url, headless = config.headless, "browser.connected");
        Ok(Self { client })
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> SessionResult<()> {
        self.client.close().await.map_err(map_cmd_error)
    }
}

fn to_locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(s) => Locator::Css(s),
        Selector::Id(s) => Locator::Id(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

/// Transport-level losses make the session unusable; everything else is a
/// recoverable command failure.
fn map_cmd_error(e: CmdError) -> SessionError {
    match e {
        CmdError::Lost(_) | CmdError::Failed(_) => SessionError::Fatal(e.to_string()),
        other => SessionError::Command(other.to_string()),
    }
}

#[async_trait]
impl Session for WebDriverSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> SessionResult<()> {
        debug!(%url, "browser.navigate");
        self.client.goto(url).await.map_err(map_cmd_error)
    }

    async fn find_element(&self, selector: &Selector) -> SessionResult<Lookup<Element>> {
        match self.client.find(to_locator(selector)).await {
            Ok(element) => Ok(Lookup::Found(element)),
            Err(e) if e.is_no_such_element() => Ok(Lookup::NotFound),
            Err(e) => Err(map_cmd_error(e)),
        }
    }

    async fn find_elements(&self, selector: &Selector) -> SessionResult<Vec<Element>> {
        self.client
            .find_all(to_locator(selector))
            .await
            .map_err(map_cmd_error)
    }

    async fn wait_for_element(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> SessionResult<Lookup<Element>> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(to_locator(selector))
            .await
        {
            Ok(element) => Ok(Lookup::Found(element)),
            Err(CmdError::WaitTimeout) => Ok(Lookup::NotFound),
            Err(e) if e.is_no_such_element() => Ok(Lookup::NotFound),
            Err(e) => Err(map_cmd_error(e)),
        }
    }

    async fn click(&self, element: &Element) -> SessionResult<()> {
        element.click().await.map_err(map_cmd_error)
    }

    async fn send_keys(&self, element: &Element, text: &str) -> SessionResult<()> {
        element.send_keys(text).await.map_err(map_cmd_error)
    }

    async fn clear(&self, element: &Element) -> SessionResult<()> {
        element.clear().await.map_err(map_cmd_error)
    }

    async fn screenshot(&self, element: &Element, path: &Path) -> SessionResult<()> {
        let png = element.screenshot().await.map_err(map_cmd_error)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Command(format!("screenshot dir: {e}")))?;
        }
        tokio::fs::write(path, png)
            .await
            .map_err(|e| SessionError::Command(format!("screenshot write: {e}")))
    }

    async fn execute_script(&self, code: &str) -> SessionResult<serde_json::Value> {
        self.client.execute(code, vec![]).await.map_err(map_cmd_error)
    }

    async fn page_source(&self) -> SessionResult<String> {
        self.client.source().await.map_err(map_cmd_error)
    }

    async fn element_text(&self, element: &Element) -> SessionResult<String> {
        element.text().await.map_err(map_cmd_error)
    }

    async fn element_html(&self, element: &Element) -> SessionResult<String> {
        element.html(false).await.map_err(map_cmd_error)
    }

    async fn current_url(&self) -> SessionResult<String> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(map_cmd_error)
    }

    async fn title(&self) -> SessionResult<String> {
        self.client.title().await.map_err(map_cmd_error)
    }
}
