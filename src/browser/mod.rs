//! Browser capability layer.
//!
//! Collection code only talks to the `Browser` and `Page` traits; the
//! Chromium implementation lives in `cdp_client`. One `Browser` is one
//! browser context (shared cookies and login state); pages are opened per
//! module or per fetch task and closed before the owning operation returns.

mod cdp_client;
#[cfg(test)]
pub(crate) mod fake;

pub use cdp_client::{ChromeLauncher, ChromePage, ChromeSession};

use crate::collector::wait::{wait_for, WaitOutcome, WaitSpec};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A single tab inside the shared browser context.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait (bounded) for the document to settle.
    async fn goto(&self, url: &str) -> Result<()>;
    /// Evaluate a script or `() => {...}` function; `undefined` maps to `Null`.
    async fn evaluate(&self, script: &str) -> Result<Value>;
    async fn current_url(&self) -> Result<String>;
    /// PNG bytes of the visible viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn close(&self) -> Result<()>;

    /// Scroll to the bottom of the document to trigger lazy loading.
    async fn scroll_to_bottom(&self) -> Result<()> {
        self.evaluate(SCROLL_TO_BOTTOM).await.map(|_| ())
    }

    async fn probe(&self, probe: &Probe) -> Result<bool> {
        let value = self.evaluate(&probe.script()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Poll until the indicator is present. Probe errors count as "absent".
    async fn wait_for_probe(&self, probe: &Probe, spec: WaitSpec) -> WaitOutcome {
        wait_for(spec, || async move { self.probe(probe).await.unwrap_or(false) }).await
    }

    async fn body_text(&self) -> Result<String> {
        let value = self
            .evaluate("() => document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// A browser context: the unit that owns cookies and login state.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
    /// Close the context and every page in it.
    async fn close(&mut self) -> Result<()>;
}

/// Builds browser contexts in the requested mode.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>>;
}

const SCROLL_TO_BOTTOM: &str = r#"
    () => {
        window.scrollTo(0, document.body.scrollHeight);
        return document.body.scrollHeight;
    }
"#;

/// A DOM indicator used by the login gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Present when the CSS selector matches at least one element.
    Selector(String),
    /// Present when a visible control's text equals the literal.
    Text(String),
}

impl Probe {
    pub fn selector(selector: impl Into<String>) -> Self {
        Probe::Selector(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Probe::Text(text.into())
    }

    pub fn script(&self) -> String {
        match self {
            Probe::Selector(selector) => format!(
                "() => document.querySelectorAll({}).length > 0",
                js_string(selector)
            ),
            Probe::Text(text) => format!(
                r#"
                () => {{
                    const needle = {};
                    const candidates = document.querySelectorAll('a, button, span, div[role="button"]');
                    return Array.from(candidates).some(el =>
                        el.innerText && el.innerText.trim() === needle && el.offsetParent !== null
                    );
                }}
                "#,
                js_string(text)
            ),
        }
    }
}

/// Quote a Rust string as a JavaScript string literal.
pub fn js_string(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

/// Open a page, run `body` with it and close the page on every exit path.
pub async fn with_page<T, F, Fut>(browser: &dyn Browser, body: F) -> Result<T>
where
    F: FnOnce(Arc<dyn Page>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let page = browser.new_page().await?;
    let result = body(Arc::clone(&page)).await;
    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close page: {}", e);
    }
    result
}
