//! Xiaohongshu keyword search with author follower enrichment.

use super::js::extraction_script;
use super::{ModuleContext, ModuleOutcome, SourceModule};
use crate::browser::{with_page, Browser, Page, Probe};
use crate::collector::{LoginGate, LoginIndicators, ScriptInterrogator, ScrollCollector, WaitSpec};
use crate::error::Result;
use crate::models::{DedupKey, Item};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

const HOME_URL: &str = "https://www.xiaohongshu.com";

const NOTE_CARDS: &str = r#"
    const items = [];
    document.querySelectorAll('section.note-item, .feed-card').forEach(card => {
        try {
            const linkEl = card.querySelector('a.cover') || card.querySelector("a[href*='/explore/']");
            const href = linkEl ? linkEl.getAttribute('href') : '';
            if (!href) return;

            const titleEl = card.querySelector('.title, .name, .footer .title');
            const title = titleEl ? titleEl.innerText : 'No Title';

            const authorEl = card.querySelector('.user .name, .author-wrapper .name, .footer .author');
            const likesEl = card.querySelector('.like-wrapper .count, .footer .like-count');
            const userLinkEl = card.querySelector("a[href*='/user/profile/']");

            items.push({
                source: 'xiaohongshu',
                title,
                content: title,
                link: href,
                time: 'Today',
                author: authorEl ? authorEl.innerText : 'Unknown',
                author_link: userLinkEl ? userLinkEl.getAttribute('href') : '',
                followers: 'N/A',
                stats: { like: likesEl ? parseNumber(likesEl.innerText) : 0 }
            });
        } catch (e) {}
    });
    return items;
"#;

/// Absolute URL of the author profile linked from a note page.
const NOTE_AUTHOR: &str = r#"
    () => {
        const el = document.querySelector('.author-wrapper, .author-container, .note-author');
        if (!el) return null;
        const link = el.matches('a[href]') ? el : el.querySelector('a[href]');
        return link ? link.href : null;
    }
"#;

const FOLLOWERS: &str = r#"
    () => {
        const counts = document.querySelectorAll('.data-info .count');
        return counts.length > 1 ? counts[1].innerText.trim() : null;
    }
"#;

const NOT_FOUND: &str = "Not Found";
const ERROR: &str = "Error";

pub struct XiaohongshuModule {
    interrogator: ScriptInterrogator,
}

impl XiaohongshuModule {
    pub fn new() -> Self {
        Self {
            interrogator: ScriptInterrogator::new("xiaohongshu", extraction_script(NOTE_CARDS))
                .with_base_url(HOME_URL),
        }
    }

    fn gate(&self, ctx: &ModuleContext) -> LoginGate {
        let gate = LoginGate::new(
            &ctx.id,
            HOME_URL,
            LoginIndicators {
                authenticated: vec![Probe::selector(
                    ".user-side-content .avatar-wrapper, .side-bar .user-avatar, #user-avatar",
                )],
                unauthenticated: vec![Probe::selector(".login-btn, .login-button")],
            },
        )
        .with_manual_login(WaitSpec::secs(1, 15));

        match ctx.config.login_timeout_secs {
            Some(secs) => gate.with_manual_login_ceiling(Duration::from_secs(secs)),
            None => gate,
        }
    }

    pub fn search_url(keyword: &str) -> String {
        format!(
            "{}/search_result?keyword={}&source=web_search_result_notes",
            HOME_URL,
            urlencoding::encode(keyword)
        )
    }

    async fn scrape_keyword(
        &self,
        page: &dyn Page,
        ctx: &ModuleContext,
        keyword: &str,
        limit: usize,
        seen: &mut HashSet<DedupKey>,
    ) -> Result<Vec<Item>> {
        tracing::info!(module = %ctx.id, keyword, "Searching");
        page.goto(&Self::search_url(keyword)).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let outcome = ScrollCollector::new(limit)
            .with_max_empty_passes(3)
            .collect_unseen(page, &self.interrogator, seen)
            .await;

        Ok(outcome
            .items
            .into_iter()
            .map(|mut item| {
                item.keyword = Some(keyword.to_string());
                item
            })
            .collect())
    }

    /// Fill `followers` for every item. Never fails: problems are recorded
    /// on the item itself.
    async fn enrich_user_data(&self, page: &dyn Page, ctx: &ModuleContext, items: &mut [Item]) {
        tracing::info!(module = %ctx.id, items = items.len(), "Fetching follower counts");
        for item in items.iter_mut() {
            let followers = match self.followers_for(page, item).await {
                Ok(Some(count)) => count,
                Ok(None) => NOT_FOUND.to_string(),
                Err(e) => {
                    tracing::warn!(module = %ctx.id, "Follower lookup failed: {}", e);
                    ERROR.to_string()
                }
            };
            tracing::debug!(module = %ctx.id, author = %item.author, followers = %followers, "Enriched");
            item.followers = Some(followers);
        }
    }

    async fn followers_for(&self, page: &dyn Page, item: &Item) -> Result<Option<String>> {
        let (url, via_note) = match (non_empty(&item.author_link), non_empty(&item.link)) {
            (Some(author), _) => (author, false),
            (None, Some(note)) => (note, true),
            (None, None) => return Ok(None),
        };

        page.goto(url).await?;
        tokio::time::sleep(jitter(1.0, 2.0)).await;

        if via_note {
            let author = page.evaluate(NOTE_AUTHOR).await?;
            let Some(profile) = author.as_str() else {
                return Ok(None);
            };
            page.goto(profile).await?;
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }

        if !page.current_url().await?.contains("/user/profile") {
            return Ok(None);
        }
        let count = page.evaluate(FOLLOWERS).await?;
        Ok(count.as_str().map(str::to_string))
    }

    async fn collect(&self, page: &dyn Page, ctx: &ModuleContext) -> Result<Vec<Item>> {
        self.gate(ctx).check(page, ctx.headless).await?;

        let keywords = &ctx.config.keywords;
        if keywords.is_empty() {
            tracing::warn!(module = %ctx.id, "No keywords provided, pass one with --keyword");
        }

        // Notes found under an earlier keyword keep that keyword.
        let mut all_items = Vec::new();
        let mut seen = HashSet::new();
        for (i, keyword) in keywords.iter().enumerate() {
            let limit = ctx.limit().saturating_sub(all_items.len());
            match self.scrape_keyword(page, ctx, keyword, limit, &mut seen).await {
                Ok(items) => all_items.extend(items),
                Err(e) => tracing::error!(module = %ctx.id, keyword = %keyword, "Search failed: {}", e),
            }
            if all_items.len() >= ctx.limit() {
                tracing::info!(module = %ctx.id, limit = ctx.limit(), "Module limit reached");
                break;
            }
            if i + 1 < keywords.len() {
                tokio::time::sleep(jitter(2.0, 5.0)).await;
            }
        }

        self.enrich_user_data(page, ctx, &mut all_items).await;
        Ok(all_items)
    }
}

impl Default for XiaohongshuModule {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn jitter(min_secs: f64, max_secs: f64) -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(min_secs..max_secs))
}

#[async_trait]
impl SourceModule for XiaohongshuModule {
    fn name(&self) -> &str {
        "Xiaohongshu"
    }

    fn keyword_driven(&self) -> bool {
        true
    }

    async fn run(&self, browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome {
        with_page(browser, |page| async move { self.collect(page.as_ref(), ctx).await })
            .await
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakePage};
    use crate::config::ModuleConfig;
    use crate::error::AppError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(keywords: &[&str]) -> ModuleContext {
        ctx_with_limit(keywords, 10)
    }

    fn ctx_with_limit(keywords: &[&str], limit: usize) -> ModuleContext {
        ModuleContext::new(
            "xiaohongshu",
            ModuleConfig {
                enabled: true,
                limit,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            },
            true,
        )
    }

    fn note(id: &str, title: &str) -> Value {
        json!({
            "source": "xiaohongshu", "title": title, "content": title,
            "link": format!("/explore/{}", id), "author": id,
            "author_link": format!("/user/profile/{}", id)
        })
    }

    /// Serves `first` for the first `switch_after` extractions, `later` after.
    fn shifting_search_page(first: Value, later: Value, switch_after: usize) -> std::sync::Arc<FakePage> {
        let extractions = AtomicUsize::new(0);
        FakePage::new(move |script| {
            if script.contains("section.note-item") {
                let n = extractions.fetch_add(1, Ordering::SeqCst);
                return Ok(if n < switch_after { first.clone() } else { later.clone() });
            }
            if script.contains(".data-info .count") {
                return Ok(json!("800"));
            }
            Ok(Value::Bool(script.contains("user-avatar")))
        })
    }

    fn search_page() -> std::sync::Arc<FakePage> {
        FakePage::new(|script| {
            if script.contains("section.note-item") {
                return Ok(json!([
                    {
                        "source": "xiaohongshu", "title": "Rust 入门", "content": "Rust 入门",
                        "link": "/explore/aaa", "author": "A",
                        "author_link": "/user/profile/a", "stats": { "like": 1200 }
                    },
                    {
                        "source": "xiaohongshu", "title": "咖啡", "content": "咖啡",
                        "link": "/explore/bbb", "author": "B", "author_link": ""
                    },
                    {
                        "source": "xiaohongshu", "title": "旅行", "content": "旅行",
                        "link": "/explore/ccc", "author": "C", "author_link": ""
                    }
                ]));
            }
            if script.contains("note-author") {
                return Ok(json!("https://www.xiaohongshu.com/user/profile/b"));
            }
            if script.contains(".data-info .count") {
                return Ok(json!("1.2万"));
            }
            Ok(Value::Bool(script.contains("user-avatar")))
        })
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        assert_eq!(
            XiaohongshuModule::search_url("AI 工具"),
            "https://www.xiaohongshu.com/search_result?keyword=AI%20%E5%B7%A5%E5%85%B7&source=web_search_result_notes"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_and_enrich() {
        let browser = FakeBrowser::new(|_| search_page());

        let outcome = XiaohongshuModule::new().run(&browser, &ctx(&["rust"])).await;
        let items = outcome.items();

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.keyword.as_deref() == Some("rust")));
        assert_eq!(items[0].link.as_deref(), Some("https://www.xiaohongshu.com/explore/aaa"));
        assert_eq!(items[0].stats.get("like"), 1200.0);
        assert_eq!(items[0].followers.as_deref(), Some("1.2万"));
        // No author link: resolved through the note page.
        assert_eq!(items[1].followers.as_deref(), Some("1.2万"));

        let visits = browser.pages()[0].visits();
        assert!(visits.contains(&"https://www.xiaohongshu.com/user/profile/a".to_string()));
        assert!(visits.contains(&"https://www.xiaohongshu.com/explore/bbb".to_string()));
        assert!(browser.pages()[0].is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_keywords_yield_distinct_notes() {
        // One productive pass plus three empty ones for the first keyword.
        let browser = FakeBrowser::new(|_| {
            shifting_search_page(
                json!([note("aaa", "Rust 入门"), note("bbb", "Rust 进阶")]),
                json!([note("bbb", "Rust 进阶"), note("ccc", "Go 入门")]),
                4,
            )
        });

        let outcome = XiaohongshuModule::new().run(&browser, &ctx(&["rust", "go"])).await;
        let items = outcome.items();

        let keys: HashSet<DedupKey> = items.iter().map(Item::dedup_key).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(keys.len(), 3);
        assert_eq!(items[1].keyword.as_deref(), Some("rust"));
        assert_eq!(items[2].link.as_deref(), Some("https://www.xiaohongshu.com/explore/ccc"));
        assert_eq!(items[2].keyword.as_deref(), Some("go"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_module_limit_spans_keywords() {
        let browser = FakeBrowser::new(|_| search_page());

        let outcome = XiaohongshuModule::new()
            .run(&browser, &ctx_with_limit(&["rust", "go"], 2))
            .await;

        assert_eq!(outcome.items().len(), 2);
        let visits = browser.pages()[0].visits();
        assert!(visits.contains(&XiaohongshuModule::search_url("rust")));
        assert!(!visits.contains(&XiaohongshuModule::search_url("go")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_failures_are_recorded_on_items() {
        let page = FakePage::new(|script| {
            if script.contains("note-author") {
                return Ok(Value::Null);
            }
            Err(AppError::Extraction("detached".into()))
        });
        let mut items = vec![
            Item::new("xiaohongshu", "no author on note").with_link("https://www.xiaohongshu.com/explore/x"),
            {
                let mut item = Item::new("xiaohongshu", "profile breaks");
                item.author_link = Some("https://www.xiaohongshu.com/user/profile/y".into());
                item
            },
            Item::new("xiaohongshu", "nothing to visit"),
        ];

        XiaohongshuModule::new()
            .enrich_user_data(page.as_ref(), &ctx(&[]), &mut items)
            .await;

        assert_eq!(items[0].followers.as_deref(), Some(NOT_FOUND));
        assert_eq!(items[1].followers.as_deref(), Some(ERROR));
        assert_eq!(items[2].followers.as_deref(), Some(NOT_FOUND));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_keywords_collects_nothing() {
        let browser = FakeBrowser::new(|_| search_page());

        let outcome = XiaohongshuModule::new().run(&browser, &ctx(&[])).await;

        assert!(matches!(outcome, ModuleOutcome::Success(ref items) if items.is_empty()));
    }
}
