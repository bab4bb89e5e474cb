//! Source modules and the static registry the orchestrator resolves them from.

pub mod js;
pub mod twitter;
pub mod weibo;
pub mod xiaohongshu;

use crate::browser::Browser;
use crate::config::ModuleConfig;
use crate::error::{AppError, Result};
use crate::models::Item;
use async_trait::async_trait;
use std::path::PathBuf;

pub use twitter::TwitterModule;
pub use weibo::WeiboModule;
pub use xiaohongshu::XiaohongshuModule;

/// Result of one module run, matched explicitly by the orchestrator.
#[derive(Debug)]
pub enum ModuleOutcome {
    Success(Vec<Item>),
    /// Login could not be established; carries the module id.
    AuthRequired(String),
    Failure(AppError),
}

impl ModuleOutcome {
    pub fn items(&self) -> &[Item] {
        match self {
            ModuleOutcome::Success(items) => items,
            _ => &[],
        }
    }
}

impl From<Result<Vec<Item>>> for ModuleOutcome {
    fn from(result: Result<Vec<Item>>) -> Self {
        match result {
            Ok(items) => ModuleOutcome::Success(items),
            Err(AppError::AuthRequired(module)) => ModuleOutcome::AuthRequired(module),
            Err(e) => ModuleOutcome::Failure(e),
        }
    }
}

/// Immutable per-run view handed to a module: its resolved config plus the
/// session's current browser mode.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub id: String,
    pub config: ModuleConfig,
    pub headless: bool,
    /// Where modules may drop debug artifacts (screenshots).
    pub output_dir: PathBuf,
}

impl ModuleContext {
    pub fn new(id: impl Into<String>, config: ModuleConfig, headless: bool) -> Self {
        Self {
            id: id.into(),
            config,
            headless,
            output_dir: PathBuf::from("outputs"),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn limit(&self) -> usize {
        self.config.limit
    }
}

#[async_trait]
pub trait SourceModule: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Whether a runtime keyword replaces the configured keyword list.
    fn keyword_driven(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ModuleContext) -> Result<()> {
        ctx.config.validate(&ctx.id)
    }

    /// Collect within the shared browser context. Pages opened here must be
    /// closed before returning.
    async fn run(&self, browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome;
}

type ModuleFactory = Box<dyn Fn() -> Box<dyn SourceModule> + Send + Sync>;

/// Ordered mapping from module identifier to a constructor.
pub struct ModuleRegistry {
    entries: Vec<(String, ModuleFactory)>,
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The built-in sources, in the order "all enabled" runs them.
    pub fn builtin() -> Self {
        Self::empty()
            .register("twitter", || Box::new(TwitterModule::new()))
            .register("weibo", || Box::new(WeiboModule::new()))
            .register("xiaohongshu", || Box::new(XiaohongshuModule::new()))
    }

    /// Adds or replaces a module. Replacing keeps the original position.
    pub fn register<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SourceModule> + Send + Sync + 'static,
    {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = Box::new(factory),
            None => self.entries.push((id, Box::new(factory))),
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn create(&self, id: &str) -> Option<Box<dyn SourceModule>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, factory)| factory())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
