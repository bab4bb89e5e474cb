//! Concurrent one-page-per-platform fetch against a shared browser context.

use crate::browser::{with_page, Browser};
use crate::config::{CrawlerConfig, TrendsConfig};
use crate::error::{AppError, Result};
use crate::models::TrendItem;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    pub id: String,
    /// Label attached to every item from this platform.
    pub name: String,
    pub url: String,
}

impl PlatformTarget {
    /// Platforms to fetch: the requested ids that are configured and
    /// enabled, or every enabled platform.
    pub fn resolve(config: &TrendsConfig, requested: Option<&[String]>) -> Vec<PlatformTarget> {
        let to_target = |id: &str| {
            let platform = config.platforms.get(id)?;
            if !platform.enabled {
                return None;
            }
            Some(PlatformTarget {
                id: id.to_string(),
                name: platform.name.clone().unwrap_or_else(|| id.to_string()),
                url: platform.url.clone(),
            })
        };

        match requested {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let target = to_target(id.trim());
                    if target.is_none() {
                        tracing::warn!(platform = %id, "Platform not configured or disabled");
                    }
                    target
                })
                .collect(),
            None => config.platforms.keys().filter_map(|id| to_target(id)).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchResults {
    pub items: Vec<TrendItem>,
    /// Platform id to failure message.
    pub errors: BTreeMap<String, String>,
}

pub struct FanOutFetcher {
    timeout: Duration,
    warmup_url: Option<String>,
    warmup_timeout: Duration,
}

impl FanOutFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            warmup_url: None,
            warmup_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            warmup_url: config.warmup_url.clone(),
            ..Self::new(Duration::from_secs(config.timeout_secs))
        }
    }

    pub fn with_warmup_url(mut self, url: impl Into<String>) -> Self {
        self.warmup_url = Some(url.into());
        self
    }

    pub async fn fetch_all(&self, browser: &dyn Browser, targets: &[PlatformTarget]) -> FetchResults {
        self.warm_up(browser).await;

        let fetches = targets.iter().map(|target| self.fetch_platform(browser, target));
        let outcomes = join_all(fetches).await;

        let mut results = FetchResults::default();
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(items) => {
                    tracing::info!(platform = %target.id, items = items.len(), "Fetched");
                    results.items.extend(items);
                }
                Err(e) => {
                    tracing::warn!(platform = %target.id, "Error fetching {}: {}", target.name, e);
                    results.errors.insert(target.id.clone(), e.to_string());
                }
            }
        }
        results
    }

    /// Visit the aggregator home once so the context picks up its cookies.
    async fn warm_up(&self, browser: &dyn Browser) {
        let Some(url) = self.warmup_url.as_deref() else {
            return;
        };
        let result = with_page(browser, |page| async move {
            match tokio::time::timeout(self.warmup_timeout, page.goto(url)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Navigation(format!("{}: warm-up timed out", url))),
            }
        })
        .await;
        if let Err(e) = result {
            tracing::debug!("Warm-up skipped: {}", e);
        }
    }

    async fn fetch_platform(&self, browser: &dyn Browser, target: &PlatformTarget) -> Result<Vec<TrendItem>> {
        with_page(browser, |page| async move {
            match tokio::time::timeout(self.timeout, page.goto(&target.url)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AppError::Navigation(format!(
                        "{}: timed out after {}s",
                        target.url,
                        self.timeout.as_secs()
                    )))
                }
            }
            let body = page.body_text().await?;
            parse_platform_body(&target.name, &body)
        })
        .await
    }
}

/// Decode an endpoint body: `{"data": [...]}`, `{"items": [...]}` or a bare
/// array. Non-object entries are skipped.
pub fn parse_platform_body(platform: &str, body: &str) -> Result<Vec<TrendItem>> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| AppError::Extraction(format!("{}: response is not JSON ({})", platform, e)))?;

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("items")) {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(records
        .into_iter()
        .filter_map(|record| match record {
            Value::Object(fields) => Some(TrendItem::new(platform, fields)),
            _ => None,
        })
        .collect())
}
