//! Structured answer payloads.
//!
//! A payload travels as a JSON mapping holding any of these keys:
//!
//! - `{"answer": "..."}`
//! - `{"table": {"columns": [...], "data": [[...], ...]}}`
//! - `{"bar": {"columns": [...], "data": [n, ...]}}`
//! - `{"line": {"columns": [...], "data": [n, ...]}}`
//!
//! In memory each recognized key becomes a [`ResultPart`] variant. Keys that
//! are unknown, or whose value does not have the documented shape, are kept
//! verbatim in `extra` so the payload round-trips without loss.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

pub const ANSWER_KEY: &str = "answer";
pub const TABLE_KEY: &str = "table";
pub const BAR_KEY: &str = "bar";
pub const LINE_KEY: &str = "line";

/// Tabular result: header row plus data rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

/// Category labels paired with one numeric value each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub columns: Vec<String>,
    pub data: Vec<Number>,
}

/// One recognized result kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPart {
    /// Plain text answer.
    Answer(String),
    /// Table to render as a grid.
    Table(TableData),
    /// Bar chart series.
    Bar(ChartSeries),
    /// Line chart series.
    Line(ChartSeries),
}

impl ResultPart {
    /// The wire key this part serializes under.
    pub fn key(&self) -> &'static str {
        match self {
            ResultPart::Answer(_) => ANSWER_KEY,
            ResultPart::Table(_) => TABLE_KEY,
            ResultPart::Bar(_) => BAR_KEY,
            ResultPart::Line(_) => LINE_KEY,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ResultPart::Answer(text) => Value::String(text.clone()),
            ResultPart::Table(table) => json!({ "columns": table.columns, "data": table.data }),
            ResultPart::Bar(series) | ResultPart::Line(series) => {
                json!({ "columns": series.columns, "data": series.data })
            }
        }
    }

    fn from_entry(key: &str, value: &Value) -> Option<Self> {
        match key {
            ANSWER_KEY => value.as_str().map(|s| ResultPart::Answer(s.to_string())),
            TABLE_KEY => serde_json::from_value(value.clone()).ok().map(ResultPart::Table),
            BAR_KEY => serde_json::from_value(value.clone()).ok().map(ResultPart::Bar),
            LINE_KEY => serde_json::from_value(value.clone()).ok().map(ResultPart::Line),
            _ => None,
        }
    }
}

/// Structured answer returned to callers, cached, and logged to history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct StructuredResult {
    parts: Vec<ResultPart>,
    extra: Map<String, Value>,
}

impl StructuredResult {
    /// A payload holding only a text answer.
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            parts: vec![ResultPart::Answer(answer.into())],
            extra: Map::new(),
        }
    }

    /// Build a payload from parts; a later part replaces an earlier one of the same kind.
    pub fn from_parts(parts: impl IntoIterator<Item = ResultPart>) -> Self {
        let mut result = Self::default();
        for part in parts {
            result.push(part);
        }
        result
    }

    /// Add a part, replacing any existing part of the same kind.
    pub fn push(&mut self, part: ResultPart) {
        self.parts.retain(|p| p.key() != part.key());
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[ResultPart] {
        &self.parts
    }

    /// Keys that were not recognized as a result kind, with their raw values.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn answer(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            ResultPart::Answer(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn table(&self) -> Option<&TableData> {
        self.parts.iter().find_map(|p| match p {
            ResultPart::Table(table) => Some(table),
            _ => None,
        })
    }

    pub fn bar(&self) -> Option<&ChartSeries> {
        self.parts.iter().find_map(|p| match p {
            ResultPart::Bar(series) => Some(series),
            _ => None,
        })
    }

    pub fn line(&self) -> Option<&ChartSeries> {
        self.parts.iter().find_map(|p| match p {
            ResultPart::Line(series) => Some(series),
            _ => None,
        })
    }

    /// Whether the payload carries at least one recognized result kind.
    ///
    /// Payloads without one are logged to history but never enter the quick-answer cache.
    pub fn is_cacheable(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Serialize to the wire mapping.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a wire mapping. Fails when the text is not a JSON object.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl From<Map<String, Value>> for StructuredResult {
    fn from(mut map: Map<String, Value>) -> Self {
        let mut parts = Vec::new();
        for key in [ANSWER_KEY, TABLE_KEY, BAR_KEY, LINE_KEY] {
            let Some(value) = map.get(key) else {
                continue;
            };
            if let Some(part) = ResultPart::from_entry(key, value) {
                parts.push(part);
                map.remove(key);
            }
        }
        Self { parts, extra: map }
    }
}

impl From<StructuredResult> for Map<String, Value> {
    fn from(result: StructuredResult) -> Self {
        let mut map = result.extra;
        for part in &result.parts {
            map.insert(part.key().to_string(), part.to_value());
        }
        map
    }
}
