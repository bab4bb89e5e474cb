//! Ranking of collected items: keyword relevance first, engagement as a
//! tiebreaker-scale adjustment.

pub mod analysis;

pub use analysis::{
    analyze, collection_topics, extract_topics, signals, CollectionAnalysis, RankingRecord,
    INVESTMENT_KEYWORDS,
};

use crate::config::{ModuleConfig, ScoringConfig};
use crate::models::Item;
use serde::Serialize;
use std::cmp::Ordering;

/// Signal keywords for "AI content for beginners".
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "AI", "GPT", "LLM", "Prompt", "Cursor", "Trae", "Claude", "Gemini", "教程", "指南", "入门",
    "小白", "学习", "怎么", "如何", "Tutorial", "Guide", "Beginner", "How to", "Introduction",
    "Tips", "工具", "神器", "推荐", "整理", "汇总", "Agent", "RAG",
];

/// Linear weights over the `stats` counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementWeights {
    pub like: f64,
    pub repost: f64,
    pub reply: f64,
    /// Views are routinely orders of magnitude larger than other counters.
    pub view: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            like: 1.0,
            repost: 2.0,
            reply: 1.0,
            view: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub matched_keywords: Vec<String>,
    pub engagement: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    pub fn reason(&self) -> String {
        format!(
            "Keywords: {}, Engagement: {:.1}",
            self.matched_keywords.len(),
            self.engagement
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    keywords: Vec<String>,
    keyword_weight: f64,
    engagement_divisor: f64,
    weights: EngagementWeights,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

impl ScoringEngine {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            keyword_weight: 50.0,
            engagement_divisor: 100.0,
            weights: EngagementWeights::default(),
        }
    }

    /// Uses `keywords` when given, the default signal set otherwise.
    pub fn with_keywords_or_default(keywords: Option<&[String]>) -> Self {
        match keywords {
            Some(keywords) if !keywords.is_empty() => Self::new(keywords.to_vec()),
            _ => Self::default(),
        }
    }

    /// Engine for a module: its `score_keywords` and `scoring` overrides on
    /// top of the defaults.
    pub fn for_module(config: &ModuleConfig) -> Self {
        let engine = Self::with_keywords_or_default(config.score_keywords.as_deref());
        match &config.scoring {
            Some(scoring) => engine.with_config(scoring),
            None => engine,
        }
    }

    pub fn with_config(mut self, config: &ScoringConfig) -> Self {
        if let Some(weight) = config.keyword_weight {
            self = self.with_keyword_weight(weight);
        }
        if let Some(divisor) = config.engagement_divisor {
            self = self.with_engagement_divisor(divisor);
        }
        let defaults = self.weights;
        self.with_weights(EngagementWeights {
            like: config.like_weight.unwrap_or(defaults.like),
            repost: config.repost_weight.unwrap_or(defaults.repost),
            reply: config.reply_weight.unwrap_or(defaults.reply),
            view: config.view_weight.unwrap_or(defaults.view),
        })
    }

    pub fn with_weights(mut self, weights: EngagementWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_keyword_weight(mut self, weight: f64) -> Self {
        self.keyword_weight = weight;
        self
    }

    pub fn with_engagement_divisor(mut self, divisor: f64) -> Self {
        self.engagement_divisor = if divisor > 0.0 { divisor } else { 1.0 };
        self
    }

    pub fn score(&self, item: &Item) -> ScoreBreakdown {
        let text = item.searchable_text().to_lowercase();
        let matched_keywords: Vec<String> = self
            .keywords
            .iter()
            .filter(|kw| !kw.is_empty() && text.contains(&kw.to_lowercase()))
            .cloned()
            .collect();

        let stats = &item.stats;
        let engagement = stats.get("like") * self.weights.like
            + stats.get("repost") * self.weights.repost
            + stats.get("reply") * self.weights.reply
            + stats.get("view") * self.weights.view;

        let total = matched_keywords.len() as f64 * self.keyword_weight
            + engagement / self.engagement_divisor;

        ScoreBreakdown {
            matched_keywords,
            engagement,
            total: (total * 100.0).round() / 100.0,
        }
    }

    /// Attach `score` and `recommendation_reason`. Already scored items are
    /// returned unchanged.
    pub fn apply(&self, mut item: Item) -> Item {
        if item.is_scored() {
            return item;
        }
        let breakdown = self.score(&item);
        item.recommendation_reason = Some(breakdown.reason());
        item.score = Some(breakdown.total);
        item
    }

    /// Score every item and order by score descending; ties keep collection order.
    pub fn rank(&self, items: Vec<Item>) -> Vec<Item> {
        let mut scored: Vec<Item> = items.into_iter().map(|item| self.apply(item)).collect();
        scored.sort_by(|a, b| compare_scores(b.score, a.score));
        scored
    }
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(0.0)
        .partial_cmp(&b.unwrap_or(0.0))
        .unwrap_or(Ordering::Equal)
}
