//! Runs the module plan against one shared browser context and applies the
//! headless-to-headful restart policy.

use crate::browser::{Browser, BrowserLauncher};
use crate::config::Config;
use crate::error::AppError;
use crate::models::CollectedData;
use crate::modules::{ModuleContext, ModuleOutcome, ModuleRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The resolved CLI triple.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Explicit module list; `None` runs every enabled module.
    pub modules: Option<Vec<String>>,
    pub headless: Option<bool>,
    /// Replaces the keyword list of keyword-driven modules.
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub plan: Vec<String>,
    pub data: CollectedData,
    pub restarts: u32,
    /// Browser mode the run finished in.
    pub headless: bool,
    /// True when the run stopped before the plan was exhausted.
    pub aborted: bool,
}

impl CollectionReport {
    pub fn total_items(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

struct CollectionSession {
    browser: Option<Box<dyn Browser>>,
    headless: bool,
    collected: CollectedData,
    restarts: u32,
}

impl CollectionSession {
    fn new(headless: bool) -> Self {
        Self {
            browser: None,
            headless,
            collected: CollectedData::new(),
            restarts: 0,
        }
    }

    async fn close_browser(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
        }
    }
}

enum PassResult {
    Completed,
    /// A headless run hit a login wall.
    Escalate(String),
    LaunchFailed(AppError),
}

pub struct Orchestrator {
    launcher: Arc<dyn BrowserLauncher>,
    registry: ModuleRegistry,
    config: Config,
    output_dir: PathBuf,
    max_restarts: u32,
    inter_module_delay: Duration,
}

impl Orchestrator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, registry: ModuleRegistry, config: Config) -> Self {
        let output_dir = PathBuf::from(&config.global.output_dir);
        Self {
            launcher,
            registry,
            config,
            output_dir,
            max_restarts: 1,
            inter_module_delay: Duration::from_secs(2),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_inter_module_delay(mut self, delay: Duration) -> Self {
        self.inter_module_delay = delay;
        self
    }

    /// Module ids to run, in order.
    pub fn plan(&self, request: &RunRequest) -> Vec<String> {
        match &request.modules {
            Some(requested) => {
                let mut plan: Vec<String> = Vec::new();
                for id in requested {
                    if !self.config.modules.contains_key(id) {
                        tracing::warn!(module = %id, "Module not found in config");
                    } else if !self.registry.contains(id) {
                        tracing::warn!(module = %id, "No implementation registered for module");
                    } else if !plan.contains(id) {
                        plan.push(id.clone());
                    }
                }
                plan
            }
            None => self
                .registry
                .ids()
                .filter(|id| self.config.modules.get(*id).is_some_and(|m| m.enabled))
                .map(str::to_string)
                .collect(),
        }
    }

    pub async fn run(&self, request: RunRequest) -> CollectionReport {
        let plan = self.plan(&request);
        let headless = request.headless.unwrap_or(self.config.global.browser.headless);
        tracing::info!(?plan, headless, "Planned modules");

        let mut session = CollectionSession::new(headless);
        let mut aborted = false;

        loop {
            match self.run_pass(&plan, &request, &mut session).await {
                PassResult::Completed => break,
                PassResult::Escalate(module) => {
                    session.close_browser().await;
                    if session.restarts >= self.max_restarts {
                        tracing::error!(
                            module = %module,
                            max_restarts = self.max_restarts,
                            "Max restarts reached, aborting"
                        );
                        aborted = true;
                        break;
                    }
                    session.restarts += 1;
                    session.headless = false;
                    tracing::warn!(module = %module, "Login required, restarting browser in headful mode");
                }
                PassResult::LaunchFailed(e) => {
                    tracing::error!("Failed to launch browser: {}", e);
                    aborted = true;
                    break;
                }
            }
        }

        session.close_browser().await;

        for id in &plan {
            session.collected.entry(id.clone()).or_default();
        }

        CollectionReport {
            plan,
            data: session.collected,
            restarts: session.restarts,
            headless: session.headless,
            aborted,
        }
    }

    /// One pass over the modules not yet in `collected`.
    async fn run_pass(
        &self,
        plan: &[String],
        request: &RunRequest,
        session: &mut CollectionSession,
    ) -> PassResult {
        let mut ran_any = false;

        for id in plan {
            if session.collected.contains_key(id) {
                tracing::debug!(module = %id, "Already collected, skipping");
                continue;
            }

            let (Some(module), Some(module_config)) =
                (self.registry.create(id), self.config.modules.get(id))
            else {
                session.collected.insert(id.clone(), Vec::new());
                continue;
            };

            let mut config = module_config.clone();
            if module.keyword_driven() {
                if let Some(keyword) = &request.keyword {
                    tracing::info!(module = %id, keyword = %keyword, "Using runtime keyword");
                    config.keywords = vec![keyword.clone()];
                }
            }
            let ctx = ModuleContext::new(id.clone(), config, session.headless)
                .with_output_dir(self.output_dir.clone());

            if let Err(e) = module.validate(&ctx) {
                tracing::error!(module = %id, "Invalid module config: {}", e);
                session.collected.insert(id.clone(), Vec::new());
                continue;
            }

            if session.browser.is_none() {
                match self.launcher.launch(session.headless).await {
                    Ok(browser) => session.browser = Some(browser),
                    Err(e) => return PassResult::LaunchFailed(e),
                }
            }
            let Some(browser) = session.browser.as_deref() else {
                continue;
            };

            if ran_any && !self.inter_module_delay.is_zero() {
                tokio::time::sleep(self.inter_module_delay).await;
            }
            ran_any = true;

            tracing::info!(module = %id, name = module.name(), headless = session.headless, "Running module");
            match module.run(browser, &ctx).await {
                ModuleOutcome::Success(items) => {
                    tracing::info!(module = %id, items = items.len(), "Module finished");
                    session.collected.insert(id.clone(), items);
                }
                ModuleOutcome::AuthRequired(_) if session.headless => {
                    return PassResult::Escalate(id.clone());
                }
                ModuleOutcome::AuthRequired(_) => {
                    tracing::error!(module = %id, "Login required but already headful, skipping module");
                    session.collected.insert(id.clone(), Vec::new());
                }
                ModuleOutcome::Failure(e) => {
                    tracing::error!(module = %id, "Module failed: {}", e);
                    session.collected.insert(id.clone(), Vec::new());
                }
            }
        }

        PassResult::Completed
    }
}
