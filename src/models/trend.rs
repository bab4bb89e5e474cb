use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A headline returned by a trend aggregation endpoint.
///
/// Endpoints disagree on field names, so the raw record is kept and read
/// through accessors that try the known aliases in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendItem {
    pub platform: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TrendItem {
    pub fn new(platform: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            platform: platform.into(),
            fields,
        }
    }

    fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.fields.get(*k).and_then(Value::as_str))
    }

    pub fn title(&self) -> &str {
        self.first_str(&["title", "text", "name"]).unwrap_or("")
    }

    pub fn url(&self) -> Option<&str> {
        self.first_str(&["url", "mobileUrl"])
    }

    pub fn pub_date(&self) -> Option<&str> {
        self.first_str(&["pubDate"])
    }

    /// Popularity value; strings such as `"1.2万"` are expanded.
    pub fn hotness(&self) -> f64 {
        let raw = ["hot", "heat", "score"]
            .iter()
            .find_map(|k| self.fields.get(*k));

        match raw {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => parse_hotness(s),
            _ => 0.0,
        }
    }
}

fn parse_hotness(raw: &str) -> f64 {
    let raw = raw.trim().replace(',', "");
    if let Some(stripped) = raw.strip_suffix('万') {
        return stripped.trim().parse::<f64>().map(|v| v * 10_000.0).unwrap_or(0.0);
    }
    raw.parse::<f64>().unwrap_or(0.0)
}
