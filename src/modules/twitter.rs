//! X/Twitter list timeline.

use super::js::extraction_script;
use super::{ModuleContext, ModuleOutcome, SourceModule};
use crate::browser::{with_page, Browser, Page, Probe};
use crate::collector::{LoginGate, LoginIndicators, ScriptInterrogator, ScrollCollector, WaitSpec};
use crate::error::Result;
use crate::models::Item;
use crate::scoring::ScoringEngine;
use async_trait::async_trait;
use std::time::Duration;

const HOME_URL: &str = "https://x.com/home";
const LISTS_URL: &str = "https://x.com/i/lists";

const FIRST_LIST: &str = r#"
    () => {
        const link = document.querySelector('div[data-testid="cellInnerDiv"] a[href*="/lists/"]');
        return link ? link.href : null;
    }
"#;

const TWEETS: &str = r#"
    const items = [];
    document.querySelectorAll('article[data-testid="tweet"]').forEach(article => {
        try {
            const timeElement = article.querySelector('time');
            const timeLink = timeElement?.parentElement;
            if (!timeLink || !timeLink.href) return;

            const tweetUrl = timeLink.href;
            const tweetId = tweetUrl.split('/status/')[1]?.split('?')[0];
            if (!tweetId) return;

            const tweetText = article.querySelector('[data-testid="tweetText"]')?.innerText || '';
            if (!tweetText) return;

            const userParts = (article.querySelector('[data-testid="User-Name"]')?.innerText || '').split('\n');

            const extractNum = (text) => {
                const match = (text || '').match(/(\d+(?:[,.]\d+)?(?:[KM万])?)/);
                return match ? parseNumber(match[0]) : 0;
            };

            let reply = 0, repost = 0, like = 0, view = 0;
            article.querySelectorAll('button[data-testid], a[href*="/analytics"]').forEach(btn => {
                const testId = btn.getAttribute('data-testid');
                const ariaLabel = btn.getAttribute('aria-label') || '';
                const count = extractNum(ariaLabel) || parseNumber(btn.innerText);
                if (testId === 'reply') reply = count;
                else if (testId === 'retweet') repost = count;
                else if (testId === 'like') like = count;
                else if (ariaLabel.includes('View') || ariaLabel.includes('查看') || ariaLabel.includes('观看')
                    || (btn.href || '').includes('/analytics')) view = count;
            });

            items.push({
                source: 'twitter',
                id: tweetId,
                author: userParts[0] || '',
                handle: userParts[1] || '',
                content: tweetText,
                link: tweetUrl,
                time: timeElement.getAttribute('datetime') || '',
                stats: { reply, repost, like, view }
            });
        } catch (e) {}
    });
    return items;
"#;

pub struct TwitterModule {
    interrogator: ScriptInterrogator,
}

impl TwitterModule {
    pub fn new() -> Self {
        Self {
            interrogator: ScriptInterrogator::new("twitter", extraction_script(TWEETS))
                .with_base_url("https://x.com"),
        }
    }

    fn gate(&self, ctx: &ModuleContext) -> LoginGate {
        let gate = LoginGate::new(
            &ctx.id,
            HOME_URL,
            LoginIndicators {
                authenticated: vec![
                    Probe::selector(r#"[data-testid="SideNav_AccountSwitcher_Button"]"#),
                    Probe::selector(r#"[data-testid="AppTabBar_Profile_Link"]"#),
                ],
                unauthenticated: vec![
                    Probe::selector(r#"[data-testid="loginButton"]"#),
                    Probe::selector(r#"a[href="/login"]"#),
                ],
            },
        )
        .with_manual_login(WaitSpec::secs(2, 120));

        match ctx.config.login_timeout_secs {
            Some(secs) => gate.with_manual_login_ceiling(Duration::from_secs(secs)),
            None => gate,
        }
    }

    /// Opens the configured list, or the first of the user's lists. Failures
    /// leave the page where it is.
    async fn open_list(&self, page: &dyn Page, ctx: &ModuleContext) {
        if let Some(list_url) = ctx.config.list_url.as_deref() {
            tracing::info!(module = %ctx.id, url = list_url, "Opening configured list");
            if let Err(e) = page.goto(list_url).await {
                tracing::error!(module = %ctx.id, "Error opening configured list: {}", e);
            }
            return;
        }

        tracing::info!(module = %ctx.id, "Looking for lists");
        if let Err(e) = page.goto(LISTS_URL).await {
            tracing::error!(module = %ctx.id, "Error opening lists: {}", e);
            return;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        match page.evaluate(FIRST_LIST).await {
            Ok(value) => match value.as_str() {
                Some(list_url) => {
                    tracing::info!(module = %ctx.id, url = list_url, "Found list");
                    if let Err(e) = page.goto(list_url).await {
                        tracing::error!(module = %ctx.id, "Error opening list: {}", e);
                    }
                }
                None => tracing::warn!(module = %ctx.id, "No lists found, staying on current page"),
            },
            Err(e) => tracing::error!(module = %ctx.id, "Error looking up lists: {}", e),
        }
    }

    async fn collect(&self, page: &dyn Page, ctx: &ModuleContext) -> Result<Vec<Item>> {
        self.gate(ctx).check(page, ctx.headless).await?;
        self.open_list(page, ctx).await;

        tracing::info!(module = %ctx.id, limit = ctx.limit(), "Collecting tweets");
        let outcome = ScrollCollector::new(ctx.limit())
            .with_max_empty_passes(5)
            .collect(page, &self.interrogator)
            .await;

        Ok(ScoringEngine::for_module(&ctx.config).rank(outcome.items))
    }
}

impl Default for TwitterModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceModule for TwitterModule {
    fn name(&self) -> &str {
        "Twitter"
    }

    async fn run(&self, browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome {
        with_page(browser, |page| async move { self.collect(page.as_ref(), ctx).await })
            .await
            .into()
    }
}
