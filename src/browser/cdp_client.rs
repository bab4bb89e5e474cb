use super::{Browser, BrowserLauncher, Page};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page as CdpPage;
use futures_util::StreamExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TEMP_SESSION_PREFIX: &str = "info-collector-session-";

#[derive(Debug, Clone)]
enum Profile {
    /// Cookies and login state survive across runs.
    Persistent(PathBuf),
    /// Throwaway profile under the system temp dir, removed on close.
    Temporary,
}

/// Launches Chrome through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    profile: Profile,
    user_agent: Option<String>,
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn persistent(user_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile: Profile::Persistent(user_data_dir.into()),
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            profile: Profile::Temporary,
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    fn browser_config(&self, headless: bool, user_data_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(1280, 1024)
            .user_data_dir(user_data_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding")
            // Reduce automation fingerprints
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--exclude-switches=enable-automation")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage");

        if let Some(user_agent) = &self.user_agent {
            builder = builder.arg(format!("--user-agent={}", user_agent));
        }

        builder = if headless {
            builder.arg("--disable-gpu")
        } else {
            builder.with_head().arg("--start-maximized")
        };

        builder
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to build browser config: {}", e)))
    }

    fn resolve_user_data_dir(&self) -> Result<PathBuf> {
        match &self.profile {
            Profile::Persistent(dir) => {
                if !dir.exists() {
                    fs::create_dir_all(dir)?;
                    tracing::info!("Created persistent profile directory at {:?}", dir);
                }
                Ok(dir.clone())
            }
            Profile::Temporary => {
                let timestamp = chrono::Utc::now().timestamp_millis();
                Ok(std::env::temp_dir().join(format!("{}{}", TEMP_SESSION_PREFIX, timestamp)))
            }
        }
    }

    async fn handle_singleton_lock(&self, profile_dir: &Path) -> Result<()> {
        let lock_path = profile_dir.join("SingletonLock");
        // SingletonLock is a dangling symlink on Linux, so check the link itself.
        if fs::symlink_metadata(&lock_path).is_err() {
            return Ok(());
        }

        tracing::debug!("SingletonLock exists at {:?}", lock_path);

        let stale = fs::symlink_metadata(&lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|elapsed| elapsed.as_secs() > 300)
            .unwrap_or(false);

        if stale || !is_chrome_running_with_profile(profile_dir) {
            tracing::info!("Removing stale SingletonLock at {:?}", lock_path);
            let _ = fs::remove_file(&lock_path);
            return Ok(());
        }

        tracing::warn!("Chrome is running with this profile, waiting for it to exit...");
        for i in 1..=6 {
            tokio::time::sleep(Duration::from_secs(5)).await;

            if fs::symlink_metadata(&lock_path).is_err() {
                tracing::info!("Profile lock released after {}s", i * 5);
                return Ok(());
            }
            if !is_chrome_running_with_profile(profile_dir) {
                let _ = fs::remove_file(&lock_path);
                return Ok(());
            }
        }

        Err(AppError::Browser(
            "Chrome is already running with this profile. Please close it and try again.".into(),
        ))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>> {
        let user_data_dir = self.resolve_user_data_dir()?;
        let temporary = matches!(self.profile, Profile::Temporary);

        tracing::info!(
            headless,
            user_data_dir = %user_data_dir.display(),
            "Launching browser"
        );

        if temporary {
            cleanup_old_sessions();
        } else {
            self.handle_singleton_lock(&user_data_dir).await?;
        }

        let config = self.browser_config(headless, &user_data_dir)?;

        let mut last_error = None;
        for attempt in 1..=3u64 {
            match CdpBrowser::launch(config.clone()).await {
                Ok((browser, mut handler)) => {
                    let handler_task = tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                let error_str = format!("{:?}", e);
                                // Unknown CDP events fail to deserialize; that is noise.
                                if !error_str.contains("data did not match any variant") {
                                    tracing::debug!("Browser handler error: {}", e);
                                }
                            }
                        }
                    });

                    return Ok(Box::new(ChromeSession {
                        browser: Some(browser),
                        handler_task: Some(handler_task),
                        user_data_dir: Some(user_data_dir),
                        temporary,
                        navigation_timeout: self.navigation_timeout,
                    }));
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < 3 {
                        tracing::warn!("Launch attempt {} failed, retrying...", attempt);
                        tokio::time::sleep(Duration::from_millis(1000 * attempt)).await;
                        if !temporary {
                            let _ = self.handle_singleton_lock(&user_data_dir).await;
                        }
                    }
                }
            }
        }

        Err(AppError::Browser(format!(
            "Failed to launch browser after 3 attempts: {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

fn is_chrome_running_with_profile(profile_dir: &Path) -> bool {
    #[cfg(unix)]
    {
        let needle = profile_dir.to_string_lossy();
        if let Ok(output) = std::process::Command::new("ps").args(["aux"]).output() {
            let ps_output = String::from_utf8_lossy(&output.stdout);
            return ps_output.lines().any(|line| {
                line.contains("chrome") && line.contains("--user-data-dir") && line.contains(needle.as_ref())
            });
        }
    }
    #[cfg(not(unix))]
    let _ = profile_dir;
    false
}

/// Remove temporary profiles left behind by crashed runs (older than an hour).
fn cleanup_old_sessions() {
    let Ok(entries) = fs::read_dir(std::env::temp_dir()) else {
        return;
    };

    for entry in entries.flatten() {
        let is_session = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(TEMP_SESSION_PREFIX))
            .unwrap_or(false);
        if !is_session {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|elapsed| elapsed.as_secs() > 3600)
            .unwrap_or(false);

        if expired {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => tracing::debug!("Removed old session {:?}", entry.path()),
                Err(e) => tracing::debug!("Failed to remove old session dir: {}", e),
            }
        }
    }
}

/// A running Chrome instance; the whole instance is one browser context.
pub struct ChromeSession {
    browser: Option<CdpBrowser>,
    handler_task: Option<JoinHandle<()>>,
    user_data_dir: Option<PathBuf>,
    temporary: bool,
    navigation_timeout: Duration,
}

impl ChromeSession {
    fn remove_temporary_profile(dir: &Path) {
        if let Err(e) = fs::remove_dir_all(dir) {
            tracing::debug!("Failed to remove user data dir {:?}: {}", dir, e);
        }
    }
}

#[async_trait]
impl Browser for ChromeSession {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| AppError::Browser("Browser already closed".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Browser(format!("Failed to create new page: {}", e)))?;

        Ok(Arc::new(ChromePage {
            page,
            navigation_timeout: self.navigation_timeout,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        tracing::info!("Closing browser");

        let closed = match self.browser.take() {
            Some(mut browser) => {
                let result = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| AppError::Browser(format!("Failed to close browser: {}", e)));
                let _ = browser.wait().await;
                result
            }
            None => Ok(()),
        };

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        if let Some(dir) = self.user_data_dir.take() {
            if self.temporary {
                Self::remove_temporary_profile(&dir);
            }
        }

        closed
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.browser.is_none() && self.user_data_dir.is_none() {
            return;
        }
        let browser = self.browser.take();
        let handler_task = self.handler_task.take();
        let user_data_dir = self.user_data_dir.take().filter(|_| self.temporary);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Some(mut browser) = browser {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                }
                if let Some(task) = handler_task {
                    task.abort();
                }
                if let Some(dir) = user_data_dir {
                    ChromeSession::remove_temporary_profile(&dir);
                }
            });
        }
    }
}

/// One Chrome tab.
pub struct ChromePage {
    page: CdpPage,
    navigation_timeout: Duration,
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        tracing::debug!("Navigating to {}", url);

        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(AppError::Navigation(format!("Failed to navigate to {}: {}", url, e)))
            }
            Err(_) => {
                return Err(AppError::Navigation(format!(
                    "Navigation to {} timed out after {:?}",
                    url, self.navigation_timeout
                )))
            }
        }

        // Lazy pages keep loading after the navigation resolves; give them a bounded moment.
        match tokio::time::timeout(Duration::from_secs(5), self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Navigation wait error (continuing anyway): {}", e),
            Err(_) => tracing::debug!("Navigation wait timed out (continuing anyway)"),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| AppError::Extraction(format!("Failed to execute script: {}", e)))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to get URL: {}", e)))?;
        Ok(url.unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to take screenshot: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to close page: {}", e)))
    }
}
