use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Named engagement counters. Missing counters read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, f64>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: &str) -> f64 {
        self.0.get(counter).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, counter: impl Into<String>, value: f64) {
        self.0.insert(counter.into(), value);
    }

    pub fn with(mut self, counter: impl Into<String>, value: f64) -> Self {
        self.set(counter, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity used to drop repeated candidates while scrolling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Link(String),
    ContentHash(String),
}

/// Canonical record produced by every source module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_reason: Option<String>,
}

impl Item {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }

    /// Link when the source exposes a stable one, otherwise a SHA-256 of the content.
    pub fn dedup_key(&self) -> DedupKey {
        match self.link.as_deref().map(str::trim) {
            Some(link) if !link.is_empty() => DedupKey::Link(link.to_string()),
            _ => {
                let digest = Sha256::digest(self.content.trim().as_bytes());
                DedupKey::ContentHash(hex::encode(digest))
            }
        }
    }

    /// Text used for keyword matching: title and content together.
    pub fn searchable_text(&self) -> String {
        match &self.title {
            Some(title) if !self.content.contains(title.as_str()) => {
                format!("{}\n{}", title, self.content)
            }
            _ => self.content.clone(),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// Per-module results keyed by module identifier.
pub type CollectedData = BTreeMap<String, Vec<Item>>;
