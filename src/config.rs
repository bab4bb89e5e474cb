use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const HEADLESS_ENV: &str = "INFO_COLLECTOR_HEADLESS";
pub const OUTPUT_DIR_ENV: &str = "INFO_COLLECTOR_OUTPUT_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
    #[serde(default)]
    pub trends: TrendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_url: Option<String>,
    /// Replaces the module's built-in scoring keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_keywords: Option<Vec<String>>,
    /// Ceiling for the manual-login wait in headful mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_timeout_secs: Option<u64>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringConfig>,
}

/// Overrides for the scoring constants. Unset fields keep the engine's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_divisor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_target_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    #[serde(default)]
    pub report: TrendReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_warmup_url", skip_serializing_if = "Option::is_none")]
    pub warmup_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReportConfig {
    #[serde(default = "default_limit")]
    pub max_items_per_platform: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    20
}

fn default_target_limit() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> String {
    "outputs".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_warmup_url() -> Option<String> {
    Some("https://newsnow.busiyi.world/".to_string())
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self { headless: true }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_limit(),
            keywords: Vec::new(),
            list_url: None,
            score_keywords: None,
            login_timeout_secs: None,
            targets: Vec::new(),
            scoring: None,
        }
    }
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            crawler: CrawlerConfig::default(),
            platforms: BTreeMap::new(),
            report: TrendReportConfig::default(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            headless: true,
            user_agent: default_user_agent(),
            warmup_url: default_warmup_url(),
        }
    }
}

impl Default for TrendReportConfig {
    fn default() -> Self {
        Self {
            max_items_per_platform: default_limit(),
        }
    }
}

impl ModuleConfig {
    /// Checks that apply to every module; the module adds its own on top.
    pub fn validate(&self, module: &str) -> Result<()> {
        if self.limit == 0 {
            return Err(AppError::Configuration(format!(
                "{}: limit must be greater than 0",
                module
            )));
        }
        for target in &self.targets {
            if target.url.trim().is_empty() {
                return Err(AppError::Configuration(format!(
                    "{}: target '{}' has no url",
                    module, target.name
                )));
            }
        }
        if let Some(scoring) = &self.scoring {
            if scoring.engagement_divisor.is_some_and(|d| d <= 0.0) {
                return Err(AppError::Configuration(format!(
                    "{}: scoring.engagement_divisor must be greater than 0",
                    module
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Reads a TOML config file and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(HEADLESS_ENV) {
            match value.trim().parse::<bool>() {
                Ok(headless) => self.global.browser.headless = headless,
                Err(_) => tracing::warn!("Ignoring {}={:?}: not a boolean", HEADLESS_ENV, value),
            }
        }
        if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.global.output_dir = dir;
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.global.output_dir.trim().is_empty() {
            errors.push("Output directory must not be empty".to_string());
        }

        for (id, module) in &self.modules {
            if let Err(e) = module.validate(id) {
                errors.push(e.to_string());
            }
        }

        if self.trends.crawler.timeout_secs == 0 {
            errors.push("Crawler timeout must be greater than 0".to_string());
        }

        for (id, platform) in &self.trends.platforms {
            if !platform.url.starts_with("http://") && !platform.url.starts_with("https://") {
                errors.push(format!("Invalid URL for platform {}", id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Identifiers of modules switched on in the file.
    pub fn enabled_modules(&self) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, m)| m.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| AppError::Configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Starter configuration written into a fresh workspace.
    pub fn starter() -> Self {
        let mut modules = BTreeMap::new();
        modules.insert(
            "twitter".to_string(),
            ModuleConfig {
                enabled: true,
                limit: 20,
                ..Default::default()
            },
        );
        modules.insert(
            "weibo".to_string(),
            ModuleConfig {
                enabled: false,
                targets: vec![TargetConfig {
                    name: "人民日报".to_string(),
                    url: "https://weibo.com/u/2803301701".to_string(),
                    limit: 5,
                }],
                ..Default::default()
            },
        );
        modules.insert(
            "xiaohongshu".to_string(),
            ModuleConfig {
                enabled: false,
                limit: 10,
                keywords: vec!["AI工具".to_string()],
                ..Default::default()
            },
        );

        let mut platforms = BTreeMap::new();
        for (id, name) in [("weibo", "微博"), ("zhihu", "知乎"), ("baidu", "百度热搜")] {
            platforms.insert(
                id.to_string(),
                PlatformConfig {
                    name: Some(name.to_string()),
                    url: format!("https://newsnow.busiyi.world/api/s?id={}", id),
                    enabled: true,
                },
            );
        }

        Self {
            global: GlobalConfig::default(),
            modules,
            trends: TrendsConfig {
                platforms,
                ..Default::default()
            },
        }
    }
}

/// Filesystem locations derived from where the config file lives.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    pub user_data_dir: PathBuf,
}

impl ProjectPaths {
    pub fn resolve(config_path: &Path, config: &Config) -> Self {
        let project_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let output_dir = {
            let configured = PathBuf::from(&config.global.output_dir);
            if configured.is_absolute() {
                configured
            } else {
                project_dir.join(configured)
            }
        };

        Self {
            user_data_dir: project_dir.join("browser_data"),
            output_dir,
            project_dir,
        }
    }

    /// Creates the per-project browser profile directory on first use.
    pub fn ensure_user_data_dir(&self) -> Result<&Path> {
        if !self.user_data_dir.exists() {
            std::fs::create_dir_all(&self.user_data_dir)?;
            tracing::info!("Created browser profile directory at {:?}", self.user_data_dir);
        }
        Ok(&self.user_data_dir)
    }
}
