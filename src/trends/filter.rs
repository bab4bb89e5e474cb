use crate::models::TrendItem;
use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Keyword rules: `+kw` must all appear, `!kw` must not appear, plain
/// keywords need at least one hit when any are given. Case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordFilter {
    must_include: Vec<String>,
    must_exclude: Vec<String>,
    regular: Vec<String>,
}

impl KeywordFilter {
    pub fn parse<S: AsRef<str>>(keywords: &[S]) -> Self {
        let mut filter = Self::default();
        for raw in keywords {
            let raw = raw.as_ref().trim();
            let (bucket, term) = if let Some(term) = raw.strip_prefix('+') {
                (&mut filter.must_include, term)
            } else if let Some(term) = raw.strip_prefix('!') {
                (&mut filter.must_exclude, term)
            } else {
                (&mut filter.regular, raw)
            };
            let term = term.trim().to_lowercase();
            if !term.is_empty() {
                bucket.push(term);
            }
        }
        filter
    }

    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        if self.must_exclude.iter().any(|ex| title.contains(ex.as_str())) {
            return false;
        }
        if !self.must_include.iter().all(|inc| title.contains(inc.as_str())) {
            return false;
        }
        self.regular.is_empty() || self.regular.iter().any(|kw| title.contains(kw.as_str()))
    }
}

/// `pubDate` in one of the known formats; anything else is treated as unknown.
pub fn parse_pub_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Keep items that pass the keyword rules and are not older than
/// `max_hours`. Items without a parseable date pass the age check.
pub fn filter_trends<S: AsRef<str>>(
    items: Vec<TrendItem>,
    keywords: &[S],
    max_hours: i64,
    now: NaiveDateTime,
) -> Vec<TrendItem> {
    let filter = KeywordFilter::parse(keywords);
    let max_age = chrono::Duration::hours(max_hours);

    items
        .into_iter()
        .filter(|item| {
            let fresh = item
                .pub_date()
                .and_then(parse_pub_date)
                .map_or(true, |published| now - published <= max_age);
            fresh && filter.matches(item.title())
        })
        .collect()
}

/// Hottest first; equal hotness keeps fetch order.
pub fn sort_by_hotness(items: &mut [TrendItem]) {
    items.sort_by(|a, b| b.hotness().partial_cmp(&a.hotness()).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn trend(value: Value) -> TrendItem {
        match value {
            Value::Object(map) => TrendItem::new("zhihu", map),
            _ => unreachable!(),
        }
    }

    fn now() -> NaiveDateTime {
        parse_pub_date("2024-06-10 12:00:00").unwrap()
    }

    #[test]
    fn test_keyword_rules() {
        let filter = KeywordFilter::parse(&["AI", "芯片", "+发布", "!广告"]);

        assert!(filter.matches("新款AI芯片发布"));
        assert!(!filter.matches("新款AI芯片"));
        assert!(!filter.matches("AI发布会广告"));
        assert!(!filter.matches("新手机发布"));
        assert!(KeywordFilter::parse::<&str>(&[]).matches("anything"));
        // A bare prefix does not exclude everything.
        assert!(KeywordFilter::parse(&["!"]).matches("anything"));
    }

    #[test]
    fn test_pub_date_formats() {
        assert!(parse_pub_date("2024-06-10 08:30:00").is_some());
        assert!(parse_pub_date("2024-06-10T08:30:00").is_some());
        assert_eq!(
            parse_pub_date("2024-06-10"),
            NaiveDate::from_ymd_opt(2024, 6, 10).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert!(parse_pub_date("3 hours ago").is_none());
    }

    #[test]
    fn test_filter_by_age_and_keywords() {
        let items = vec![
            trend(json!({ "title": "AI news", "pubDate": "2024-06-09 12:00:00" })),
            trend(json!({ "title": "AI old news", "pubDate": "2024-06-01 12:00:00" })),
            trend(json!({ "title": "AI undated", "pubDate": "yesterday" })),
            trend(json!({ "title": "Sports" })),
        ];

        let kept = filter_trends(items, &["ai"], 48, now());
        let titles: Vec<&str> = kept.iter().map(TrendItem::title).collect();

        assert_eq!(titles, vec!["AI news", "AI undated"]);
    }

    #[test]
    fn test_sort_by_hotness_is_stable() {
        let mut items = vec![
            trend(json!({ "title": "a", "hot": 10 })),
            trend(json!({ "title": "b", "hot": "1.5万" })),
            trend(json!({ "title": "c" })),
            trend(json!({ "title": "d", "heat": 10 })),
        ];

        sort_by_hotness(&mut items);
        let titles: Vec<&str> = items.iter().map(TrendItem::title).collect();

        assert_eq!(titles, vec!["b", "a", "d", "c"]);
    }
}
