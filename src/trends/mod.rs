//! Trend aggregation: concurrent fetch, keyword/age filter, hotness order.

pub mod fetcher;
pub mod filter;

pub use fetcher::{parse_platform_body, FanOutFetcher, FetchResults, PlatformTarget};
pub use filter::{filter_trends, parse_pub_date, sort_by_hotness, KeywordFilter};

use crate::browser::BrowserLauncher;
use crate::config::TrendsConfig;
use crate::error::Result;
use crate::models::TrendItem;
use crate::scoring::extract_topics;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TrendRequest {
    /// Overrides `trends.keywords` when set.
    pub keywords: Option<Vec<String>>,
    /// Platform ids; `None` fetches every enabled platform.
    pub platforms: Option<Vec<String>>,
    pub max_hours: i64,
}

impl Default for TrendRequest {
    fn default() -> Self {
        Self {
            keywords: None,
            platforms: None,
            max_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    /// Matches before truncation.
    pub count: usize,
    pub platforms: Vec<String>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub items: Vec<TrendItem>,
    pub errors: BTreeMap<String, String>,
}

/// Launch a throwaway browser, fetch every platform and build the report.
pub async fn collect_trends(
    launcher: &dyn BrowserLauncher,
    config: &TrendsConfig,
    request: &TrendRequest,
    now: NaiveDateTime,
) -> Result<TrendReport> {
    let targets = PlatformTarget::resolve(config, request.platforms.as_deref());
    let keywords = request
        .keywords
        .clone()
        .unwrap_or_else(|| config.keywords.clone());
    tracing::info!(platforms = targets.len(), ?keywords, "Collecting trends");

    let mut browser = launcher.launch(config.crawler.headless).await?;
    let fetched = FanOutFetcher::from_config(&config.crawler)
        .fetch_all(browser.as_ref(), &targets)
        .await;
    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }

    Ok(build_report(fetched, &targets, keywords, request.max_hours, config.report.max_items_per_platform, now))
}

/// Filter, order and truncate fetched items.
pub fn build_report(
    fetched: FetchResults,
    targets: &[PlatformTarget],
    keywords: Vec<String>,
    max_hours: i64,
    max_items_per_platform: usize,
    now: NaiveDateTime,
) -> TrendReport {
    let mut items = filter_trends(fetched.items, &keywords, max_hours, now);
    sort_by_hotness(&mut items);

    let count = items.len();
    items.truncate(max_items_per_platform.saturating_mul(targets.len()));

    let titles: Vec<&str> = items.iter().map(TrendItem::title).collect();
    let topics = extract_topics(&titles, 5);

    TrendReport {
        count,
        platforms: targets.iter().map(|t| t.id.clone()).collect(),
        keywords,
        topics,
        items,
        errors: fetched.errors,
    }
}
