use crate::models::{CollectedData, Item};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

pub const INVESTMENT_KEYWORDS: &[&str] = &[
    "股票", "A股", "美股", "港股", "基金", "行情", "大盘", "指数", "板块", "涨停", "跌停", "抄底",
    "加仓", "减仓", "牛市", "熊市", "多头", "空头", "趋势", "回调", "反弹", "突破", "支撑", "压力",
    "估值", "财报", "利好", "利空", "主力", "资金流向", "北向", "南向", "成交量", "K线", "均线",
    "MACD", "RSI", "纳指", "道指", "标普", "创业板", "科创板",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "you", "are", "was", "but", "not", "have", "from",
    "http", "https", "com", "www", "我们", "你们", "他们", "这个", "那个", "一个", "没有", "什么",
    "就是", "还是", "可以", "因为", "所以", "但是", "如果", "已经", "自己", "这样", "不是", "真的",
];

/// An item that matched at least one signal keyword.
#[derive(Debug, Clone, Serialize)]
pub struct RankingRecord {
    pub item: Item,
    pub score: usize,
    pub matched_keywords: Vec<String>,
    pub source_module: String,
}

/// Ranking records for every item whose content contains a signal keyword,
/// most matches first. Matching is a case-sensitive substring test.
pub fn signals(collected: &CollectedData, keywords: &[&str]) -> Vec<RankingRecord> {
    let mut records: Vec<RankingRecord> = collected
        .iter()
        .flat_map(|(module, items)| {
            items.iter().filter_map(move |item| {
                let matched: Vec<String> = keywords
                    .iter()
                    .filter(|kw| item.content.contains(**kw))
                    .map(|kw| kw.to_string())
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                Some(RankingRecord {
                    item: item.clone(),
                    score: matched.len(),
                    matched_keywords: matched,
                    source_module: module.clone(),
                })
            })
        })
        .collect();

    records.sort_by(|a, b| b.score.cmp(&a.score));
    records
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\p{Han}]{2,}|[A-Za-z]{2,}").expect("token pattern is valid")
    })
}

/// Most frequent tokens across `texts`: runs of 2+ CJK characters or 2+
/// Latin letters, stop words removed. Ties break on first appearance.
pub fn extract_topics<S: AsRef<str>>(texts: &[S], top_n: usize) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut next = 0usize;

    for text in texts {
        for token in token_pattern().find_iter(text.as_ref()) {
            let token = token.as_str().to_lowercase();
            if stop.contains(token.as_str()) {
                continue;
            }
            let entry = counts.entry(token).or_insert_with(|| {
                next += 1;
                (0, next)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(top_n).map(|(token, _)| token).collect()
}

/// Derived view handed to the report renderer next to the raw data.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionAnalysis {
    pub core_topics: Vec<String>,
    pub investment_signals: Vec<RankingRecord>,
}

pub fn analyze(collected: &CollectedData) -> CollectionAnalysis {
    CollectionAnalysis {
        core_topics: collection_topics(collected, 20),
        investment_signals: signals(collected, INVESTMENT_KEYWORDS),
    }
}

/// Topics across every collected item's content.
pub fn collection_topics(collected: &CollectedData, top_n: usize) -> Vec<String> {
    let texts: Vec<&str> = collected
        .values()
        .flatten()
        .map(|item| item.content.as_str())
        .collect();
    extract_topics(&texts, top_n)
}
