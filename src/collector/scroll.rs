//! Incremental scroll / extract / dedup loop for infinite-scroll surfaces.

use crate::browser::Page;
use crate::error::{AppError, Result};
use crate::models::{DedupKey, Item};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Site-specific extraction of the candidates currently in the DOM.
#[async_trait]
pub trait Interrogator: Send + Sync {
    async fn extract(&self, page: &dyn Page) -> Result<Vec<Item>>;
}

/// Why a collection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    /// The no-new-data streak hit the threshold.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct ScrollOutcome {
    pub items: Vec<Item>,
    pub passes: u32,
    pub stop: StopReason,
}

#[derive(Debug, Clone)]
pub struct ScrollCollector {
    limit: usize,
    max_empty_passes: u32,
    settle_delay: Duration,
}

impl ScrollCollector {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            max_empty_passes: 3,
            settle_delay: Duration::from_secs(2),
        }
    }

    /// Consecutive passes without a new item before giving up.
    pub fn with_max_empty_passes(mut self, passes: u32) -> Self {
        self.max_empty_passes = passes.max(1);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Upper bound on extraction passes: every pass either adds an item or
    /// extends the streak, so at most `max_empty_passes` passes separate two
    /// additions.
    pub fn max_passes(&self) -> u32 {
        let limit = u32::try_from(self.limit).unwrap_or(u32::MAX);
        limit
            .saturating_add(1)
            .saturating_mul(self.max_empty_passes)
    }

    pub async fn collect(&self, page: &dyn Page, interrogator: &dyn Interrogator) -> ScrollOutcome {
        let mut seen = HashSet::new();
        self.collect_unseen(page, interrogator, &mut seen).await
    }

    /// Same loop, but candidates whose key is already in `seen` count as
    /// duplicates and every new key is recorded there. Lets a module share
    /// one dedup set across several targets.
    pub async fn collect_unseen(
        &self,
        page: &dyn Page,
        interrogator: &dyn Interrogator,
        seen: &mut HashSet<DedupKey>,
    ) -> ScrollOutcome {
        let mut items: Vec<Item> = Vec::new();
        let mut no_new_data_count = 0u32;
        let mut passes = 0u32;

        if self.limit == 0 {
            return ScrollOutcome {
                items,
                passes,
                stop: StopReason::LimitReached,
            };
        }

        loop {
            passes += 1;

            let candidates = match interrogator.extract(page).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!("Extraction pass {} failed: {}", passes, e);
                    Vec::new()
                }
            };

            let mut added = 0usize;
            for candidate in candidates {
                if items.len() >= self.limit {
                    break;
                }
                if seen.insert(candidate.dedup_key()) {
                    tracing::debug!("Collected: {}", preview(&candidate.content));
                    items.push(candidate);
                    added += 1;
                }
            }

            if added == 0 {
                no_new_data_count += 1;
            } else {
                no_new_data_count = 0;
            }

            if items.len() >= self.limit {
                return ScrollOutcome {
                    items,
                    passes,
                    stop: StopReason::LimitReached,
                };
            }
            if no_new_data_count >= self.max_empty_passes || passes >= self.max_passes() {
                tracing::debug!(passes, collected = items.len(), "No more new items");
                return ScrollOutcome {
                    items,
                    passes,
                    stop: StopReason::Exhausted,
                };
            }

            if let Err(e) = page.scroll_to_bottom().await {
                tracing::warn!("Scroll failed: {}", e);
            }
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

fn preview(content: &str) -> String {
    content.chars().take(30).collect::<String>().replace('\n', " ")
}

/// Interrogator that evaluates a page script returning an array of records.
///
/// Each record is decoded on its own; records that do not decode are
/// dropped. Relative links are resolved against `base_url`.
#[derive(Debug, Clone)]
pub struct ScriptInterrogator {
    source: String,
    script: String,
    base_url: Option<Url>,
}

impl ScriptInterrogator {
    pub fn new(source: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            script: script.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = Url::parse(base).ok();
        self
    }

    pub fn decode(&self, value: Value) -> Result<Vec<Item>> {
        let records = match value {
            Value::Array(records) => records,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(AppError::Extraction(format!(
                    "{}: expected an array of records, got {}",
                    self.source, other
                )))
            }
        };

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Item>(record) {
                Ok(mut item) => {
                    if item.source.is_empty() {
                        item.source = self.source.clone();
                    }
                    item.link = item.link.take().and_then(|link| self.absolutize(&link));
                    item.author_link = item.author_link.take().and_then(|link| self.absolutize(&link));
                    items.push(item);
                }
                Err(e) => tracing::debug!(source = %self.source, "Dropping malformed record: {}", e),
            }
        }
        Ok(items)
    }

    fn absolutize(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        if let Ok(url) = Url::parse(link) {
            return Some(url.to_string());
        }
        match &self.base_url {
            Some(base) => base.join(link).ok().map(|u| u.to_string()),
            None => Some(link.to_string()),
        }
    }
}

#[async_trait]
impl Interrogator for ScriptInterrogator {
    async fn extract(&self, page: &dyn Page) -> Result<Vec<Item>> {
        let value = page.evaluate(&self.script).await?;
        self.decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays a fixed sequence of passes, then keeps returning the last one.
    struct Replay {
        passes: Mutex<Vec<Vec<Item>>>,
        calls: Mutex<u32>,
    }

    impl Replay {
        fn new(passes: Vec<Vec<Item>>) -> Self {
            Self {
                passes: Mutex::new(passes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Interrogator for Replay {
        async fn extract(&self, _page: &dyn Page) -> Result<Vec<Item>> {
            *self.calls.lock().unwrap() += 1;
            let mut passes = self.passes.lock().unwrap();
            if passes.len() > 1 {
                Ok(passes.remove(0))
            } else {
                Ok(passes.first().cloned().unwrap_or_default())
            }
        }
    }

    fn post(n: usize) -> Item {
        Item::new("test", format!("post {}", n)).with_link(format!("https://example.com/{}", n))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_limit_with_unique_items() {
        let page = FakePage::blank();
        let replay = Replay::new(vec![
            vec![post(1), post(2), post(2), post(3)],
            vec![post(3), post(4), post(5), post(6)],
        ]);

        let outcome = ScrollCollector::new(4).collect(page.as_ref(), &replay).await;

        assert_eq!(outcome.stop, StopReason::LimitReached);
        assert_eq!(outcome.items.len(), 4);
        let keys: HashSet<_> = outcome.items.iter().map(Item::dedup_key).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(outcome.passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminates_on_repeated_content() {
        let page = FakePage::blank();
        let replay = Replay::new(vec![(1..=5).map(post).collect()]);

        let outcome = ScrollCollector::new(50)
            .with_max_empty_passes(4)
            .collect(page.as_ref(), &replay)
            .await;

        assert_eq!(outcome.stop, StopReason::Exhausted);
        assert_eq!(outcome.items.len(), 5);
        // One productive pass followed by four empty ones.
        assert_eq!(replay.calls(), 5);
        assert_eq!(page.scrolls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streak_resets_on_new_data() {
        let page = FakePage::blank();
        let replay = Replay::new(vec![
            vec![post(1)],
            vec![post(1)],
            vec![post(1)],
            vec![post(1), post(2)],
            vec![post(2)],
        ]);

        let outcome = ScrollCollector::new(10).collect(page.as_ref(), &replay).await;

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.passes, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_passes_count_as_empty() {
        let page = FakePage::new(|_| Ok(json!("not an array")));
        let interrogator = ScriptInterrogator::new("weibo", "() => 1");

        let outcome = ScrollCollector::new(5).collect(page.as_ref(), &interrogator).await;

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.passes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_seen_set_skips_earlier_keys() {
        let page = FakePage::blank();
        let mut seen = HashSet::new();

        let first = ScrollCollector::new(10)
            .collect_unseen(page.as_ref(), &Replay::new(vec![vec![post(1), post(2)]]), &mut seen)
            .await;
        let second = ScrollCollector::new(10)
            .collect_unseen(page.as_ref(), &Replay::new(vec![vec![post(2), post(3)]]), &mut seen)
            .await;

        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].content, "post 3");
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_collects_nothing() {
        let page = FakePage::blank();
        let replay = Replay::new(vec![vec![post(1)]]);

        let outcome = ScrollCollector::new(0).collect(page.as_ref(), &replay).await;

        assert!(outcome.items.is_empty());
        assert_eq!(replay.calls(), 0);
    }

    #[test]
    fn test_script_records_are_decoded_individually() {
        let interrogator =
            ScriptInterrogator::new("weibo", "() => []").with_base_url("https://weibo.com");

        let items = interrogator
            .decode(json!([
                { "content": "a", "link": "/1234/abc" },
                { "content": "b", "link": "//weibo.com/1234/def" },
                { "content": "c", "link": "" },
                { "content": 42 },
            ]))
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].source, "weibo");
        assert_eq!(items[0].link.as_deref(), Some("https://weibo.com/1234/abc"));
        assert_eq!(items[1].link.as_deref(), Some("https://weibo.com/1234/def"));
        assert!(items[2].link.is_none());
    }
}
