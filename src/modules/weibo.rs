//! Weibo account timelines, one configured target at a time.

use super::js::extraction_script;
use super::{ModuleContext, ModuleOutcome, SourceModule};
use crate::browser::{js_string, with_page, Browser, Page, Probe};
use crate::collector::{LoginGate, LoginIndicators, ScriptInterrogator, ScrollCollector, WaitSpec};
use crate::config::TargetConfig;
use crate::error::Result;
use crate::models::{DedupKey, Item};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

const HOME_URL: &str = "https://weibo.com";
const FEED_SELECTOR: &str = r#"article, div[class*="wbpro-feed-content"], div[class*="feed_body"]"#;

/// Toolbar buttons are assumed to be ordered repost, comment, like.
const POSTS: &str = r#"
    const items = [];
    document.querySelectorAll('article, div[class*="feed_content"], div[class*="wbpro-feed-content"]').forEach(article => {
        try {
            const textEl = article.querySelector('div[class*="wbpro-feed-content"], div[class*="detail_text"], div[class*="content"]');
            const content = textEl ? textEl.innerText : article.innerText.substring(0, 500);
            if (!content || !content.trim()) return;

            let time = 'Unknown time';
            let link = '';
            const timeEl = article.querySelector('a[class*="head_time"], a[class*="head-info_time"], a[href*="/status/"]');
            if (timeEl) {
                time = timeEl.innerText;
                link = timeEl.getAttribute('href') || '';
            }
            if (!link) {
                const anyLink = article.querySelector('a[href*="/status/"]');
                if (anyLink) link = anyLink.getAttribute('href') || '';
            }

            const stats = {};
            const toolBar = article.querySelector('div[class*="toolbar"], div[class*="feed_action"]');
            if (toolBar) {
                const buttons = toolBar.querySelectorAll('a, button, div[role="button"]');
                if (buttons.length >= 3) {
                    stats.repost = parseNumber(buttons[0].innerText);
                    stats.reply = parseNumber(buttons[1].innerText);
                    stats.like = parseNumber(buttons[buttons.length - 1].innerText);
                }
            }

            items.push({ source: 'weibo', author: AUTHOR, content: content.trim(), time, link, stats });
        } catch (e) {}
    });
    return items;
"#;

pub struct WeiboModule {
    settle_delay: Duration,
    feed_wait: WaitSpec,
    target_delay: Duration,
}

impl WeiboModule {
    pub fn new() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            feed_wait: WaitSpec::secs(1, 10),
            target_delay: Duration::from_secs(2),
        }
    }

    fn gate(&self, ctx: &ModuleContext) -> LoginGate {
        // Weibo has no reliable logged-in marker; the login control vanishing is the signal.
        let gate = LoginGate::new(
            &ctx.id,
            HOME_URL,
            LoginIndicators {
                authenticated: Vec::new(),
                unauthenticated: vec![Probe::text("登录/注册")],
            },
        )
        .with_manual_login(WaitSpec::secs(2, 120));

        match ctx.config.login_timeout_secs {
            Some(secs) => gate.with_manual_login_ceiling(Duration::from_secs(secs)),
            None => gate,
        }
    }

    fn posts_script(author: &str) -> String {
        extraction_script(&POSTS.replace("AUTHOR", &js_string(author)))
    }

    fn interrogator(target: &TargetConfig) -> ScriptInterrogator {
        ScriptInterrogator::new("weibo", Self::posts_script(&target.name)).with_base_url(HOME_URL)
    }

    /// Collects up to `limit` posts from one target, skipping anything an
    /// earlier target already produced.
    async fn scrape_target(
        &self,
        page: &dyn Page,
        ctx: &ModuleContext,
        target: &TargetConfig,
        limit: usize,
        seen: &mut HashSet<DedupKey>,
    ) -> Result<Vec<Item>> {
        tracing::info!(module = %ctx.id, target = %target.name, url = %target.url, "Scraping target");
        page.goto(&target.url).await?;
        tokio::time::sleep(self.settle_delay).await;
        page.scroll_to_bottom().await?;

        let feed = Probe::selector(FEED_SELECTOR);
        if !page.wait_for_probe(&feed, self.feed_wait).await.is_satisfied() {
            tracing::warn!(module = %ctx.id, target = %target.name, "Timeout waiting for feed content");
            self.save_debug_screenshot(page, ctx, target).await;
        }

        let outcome = ScrollCollector::new(limit)
            .with_max_empty_passes(3)
            .collect_unseen(page, &Self::interrogator(target), seen)
            .await;
        tracing::info!(module = %ctx.id, target = %target.name, items = outcome.items.len(), "Target done");
        Ok(outcome.items)
    }

    async fn save_debug_screenshot(&self, page: &dyn Page, ctx: &ModuleContext, target: &TargetConfig) {
        let path: PathBuf = ctx.output_dir.join(format!("debug_{}.png", target.name));
        let result = async {
            let png = page.screenshot().await?;
            tokio::fs::create_dir_all(&ctx.output_dir).await?;
            tokio::fs::write(&path, png).await?;
            Ok::<_, crate::error::AppError>(())
        }
        .await;
        match result {
            Ok(()) => tracing::info!(path = %path.display(), "Saved debug screenshot"),
            Err(e) => tracing::warn!("Failed to save debug screenshot: {}", e),
        }
    }

    async fn collect(&self, page: &dyn Page, ctx: &ModuleContext) -> Result<Vec<Item>> {
        self.gate(ctx).check(page, ctx.headless).await?;

        let targets = &ctx.config.targets;
        if targets.is_empty() {
            tracing::warn!(module = %ctx.id, "No targets configured");
        }

        let mut all_items = Vec::new();
        let mut seen = HashSet::new();
        for (i, target) in targets.iter().enumerate() {
            let limit = target.limit.min(ctx.limit().saturating_sub(all_items.len()));
            match self.scrape_target(page, ctx, target, limit, &mut seen).await {
                Ok(items) => all_items.extend(items),
                Err(e) => tracing::error!(module = %ctx.id, target = %target.name, "Target failed: {}", e),
            }
            if all_items.len() >= ctx.limit() {
                tracing::info!(module = %ctx.id, limit = ctx.limit(), "Module limit reached");
                break;
            }
            if i + 1 < targets.len() {
                tokio::time::sleep(self.target_delay).await;
            }
        }
        Ok(all_items)
    }
}

impl Default for WeiboModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceModule for WeiboModule {
    fn name(&self) -> &str {
        "Weibo"
    }

    async fn run(&self, browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome {
        with_page(browser, |page| async move { self.collect(page.as_ref(), ctx).await })
            .await
            .into()
    }
}
