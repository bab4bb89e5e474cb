use async_trait::async_trait;
use info_collector_lib::browser::{with_page, Browser, BrowserLauncher, Page};
use info_collector_lib::collector::{Orchestrator, RunRequest, ScriptInterrogator, ScrollCollector};
use info_collector_lib::config::Config;
use info_collector_lib::error::Result;
use info_collector_lib::models::Item;
use info_collector_lib::modules::{ModuleContext, ModuleOutcome, ModuleRegistry, SourceModule};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves a feed that grows for two passes and then stops changing.
struct FeedPage {
    batches: Vec<Value>,
    served: AtomicUsize,
    scrolls: AtomicUsize,
    closed: Mutex<bool>,
}

impl FeedPage {
    fn new() -> Self {
        let first = json!([
            { "content": "post a", "link": "/p/a" },
            { "content": "post b", "link": "/p/b" },
            { "content": "post c", "link": "/p/c" },
        ]);
        let second = json!([
            { "content": "post a", "link": "/p/a" },
            { "content": "post d", "link": "/p/d" },
            { "content": "post e" },
        ]);
        Self {
            batches: vec![first, second],
            served: AtomicUsize::new(0),
            scrolls: AtomicUsize::new(0),
            closed: Mutex::new(false),
        }
    }
}

#[async_trait]
impl Page for FeedPage {
    async fn goto(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if script.contains("window.scrollTo") {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Null);
        }
        let n = self.served.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.batches.len() - 1);
        Ok(self.batches[index].clone())
    }

    async fn current_url(&self) -> Result<String> {
        Ok("https://feed.example/home".to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    launches: Mutex<Vec<bool>>,
    pages: Mutex<Vec<Arc<FeedPage>>>,
    browsers_closed: AtomicUsize,
}

struct FeedBrowser {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Browser for FeedBrowser {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let page = Arc::new(FeedPage::new());
        self.recorder.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    async fn close(&mut self) -> Result<()> {
        self.recorder.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FeedLauncher {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl BrowserLauncher for FeedLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>> {
        self.recorder.launches.lock().unwrap().push(headless);
        Ok(Box::new(FeedBrowser {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

/// Scroll-collects the feed page.
struct FeedModule {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceModule for FeedModule {
    fn name(&self) -> &str {
        "Feed"
    }

    async fn run(&self, browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let interrogator =
            ScriptInterrogator::new(ctx.id.clone(), "() => feed()").with_base_url("https://feed.example");
        let collector = ScrollCollector::new(ctx.limit())
            .with_max_empty_passes(4)
            .with_settle_delay(Duration::from_secs(2));

        with_page(browser, |page| async move {
            Ok(collector.collect(page.as_ref(), &interrogator).await.items)
        })
        .await
        .into()
    }
}

/// Needs a visible browser to get past its login wall.
struct WalledModule {
    runs: Arc<Mutex<Vec<bool>>>,
}

#[async_trait]
impl SourceModule for WalledModule {
    fn name(&self) -> &str {
        "Walled"
    }

    async fn run(&self, _browser: &dyn Browser, ctx: &ModuleContext) -> ModuleOutcome {
        self.runs.lock().unwrap().push(ctx.headless);
        if ctx.headless {
            ModuleOutcome::AuthRequired(ctx.id.clone())
        } else {
            ModuleOutcome::Success(vec![Item::new(ctx.id.clone(), "behind the wall")])
        }
    }
}

struct Harness {
    recorder: Arc<Recorder>,
    feed_runs: Arc<AtomicUsize>,
    walled_runs: Arc<Mutex<Vec<bool>>>,
    orchestrator: Orchestrator,
}

fn harness(max_restarts: u32) -> Harness {
    let config: Config = toml::from_str(
        r#"
        [modules.feed]
        enabled = true

        [modules.walled]
        enabled = true

        [modules.later]
        enabled = true
        "#,
    )
    .unwrap();

    let recorder = Arc::new(Recorder::default());
    let feed_runs = Arc::new(AtomicUsize::new(0));
    let walled_runs = Arc::new(Mutex::new(Vec::new()));

    let registry = {
        let feed_runs = Arc::clone(&feed_runs);
        let walled_runs = Arc::clone(&walled_runs);
        let later_runs = Arc::new(AtomicUsize::new(0));
        ModuleRegistry::empty()
            .register("feed", move || {
                Box::new(FeedModule {
                    runs: Arc::clone(&feed_runs),
                })
            })
            .register("walled", move || {
                Box::new(WalledModule {
                    runs: Arc::clone(&walled_runs),
                })
            })
            .register("later", move || {
                Box::new(FeedModule {
                    runs: Arc::clone(&later_runs),
                })
            })
    };

    let launcher = Arc::new(FeedLauncher {
        recorder: Arc::clone(&recorder),
    });
    let orchestrator = Orchestrator::new(launcher, registry, config).with_max_restarts(max_restarts);

    Harness {
        recorder,
        feed_runs,
        walled_runs,
        orchestrator,
    }
}

fn request(modules: &[&str]) -> RunRequest {
    RunRequest {
        modules: Some(modules.iter().map(|m| m.to_string()).collect()),
        headless: Some(true),
        keyword: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_feed_stops_after_four_empty_passes() {
    let h = harness(1);

    let report = h.orchestrator.run(request(&["feed"])).await;

    let items = &report.data["feed"];
    assert_eq!(items.len(), 5);
    assert!(items
        .iter()
        .any(|i| i.link.as_deref() == Some("https://feed.example/p/d")));
    assert!(items.iter().any(|i| i.link.is_none() && i.content == "post e"));

    let pages = h.recorder.pages.lock().unwrap();
    assert_eq!(pages.len(), 1);
    // Two productive passes then four empty ones; no scroll after the last.
    assert_eq!(pages[0].served.load(Ordering::SeqCst), 6);
    assert_eq!(pages[0].scrolls.load(Ordering::SeqCst), 5);
    assert!(*pages[0].closed.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_login_wall_restarts_headful_and_skips_completed() {
    let h = harness(1);

    let report = h.orchestrator.run(request(&["feed", "walled"])).await;

    assert_eq!(*h.recorder.launches.lock().unwrap(), vec![true, false]);
    assert_eq!(h.recorder.browsers_closed.load(Ordering::SeqCst), 2);
    assert_eq!(h.feed_runs.load(Ordering::SeqCst), 1);
    assert_eq!(*h.walled_runs.lock().unwrap(), vec![true, false]);

    assert_eq!(report.restarts, 1);
    assert!(!report.headless);
    assert!(!report.aborted);
    assert_eq!(report.data["feed"].len(), 5);
    assert_eq!(report.data["walled"][0].content, "behind the wall");
}

#[tokio::test(start_paused = true)]
async fn test_restart_bound_keeps_partial_results() {
    let h = harness(0);

    let report = h.orchestrator.run(request(&["feed", "walled", "later"])).await;

    assert!(report.aborted);
    assert_eq!(report.restarts, 0);
    assert_eq!(*h.recorder.launches.lock().unwrap(), vec![true]);
    assert_eq!(report.data["feed"].len(), 5);
    assert!(report.data["walled"].is_empty());
    assert!(report.data["later"].is_empty());
    assert_eq!(report.plan, vec!["feed", "walled", "later"]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_modules_are_dropped_from_plan() {
    let h = harness(1);

    let report = h.orchestrator.run(request(&["feed", "missing", "feed"])).await;

    assert_eq!(report.plan, vec!["feed"]);
    assert_eq!(report.data.len(), 1);
    assert_eq!(h.feed_runs.load(Ordering::SeqCst), 1);
}
