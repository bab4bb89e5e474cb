//! Scripted in-memory browser used by unit tests.

use super::{Browser, Page};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

pub(crate) struct FakePage {
    responder: Responder,
    visits: Mutex<Vec<String>>,
    scrolls: AtomicUsize,
    evaluations: AtomicUsize,
    closed: AtomicBool,
}

impl FakePage {
    pub(crate) fn new(responder: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            visits: Mutex::new(Vec::new()),
            scrolls: AtomicUsize::new(0),
            evaluations: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn blank() -> Arc<Self> {
        Self::new(|_| Ok(Value::Null))
    }

    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub(crate) fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.visits.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if script.contains("window.scrollTo") {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Null);
        }
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        (self.responder)(script)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.visits.lock().unwrap().last().cloned().unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type PageFactory = Box<dyn Fn(usize) -> Arc<FakePage> + Send + Sync>;

/// Hands out a fresh `FakePage` per `new_page` call and remembers them.
pub(crate) struct FakeBrowser {
    factory: PageFactory,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeBrowser {
    pub(crate) fn new(factory: impl Fn(usize) -> Arc<FakePage> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let mut pages = self.pages.lock().unwrap();
        let page = (self.factory)(pages.len());
        pages.push(Arc::clone(&page));
        Ok(page)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
