//! Coaching rubric model
//!
//! LLM output is loosely shaped, so any JSON object deserializes into a
//! [`Rubric`]: nulls become defaults, scalar text fields accept numbers,
//! list items given as bare strings are promoted to their object form, and
//! free-form fields keep whatever JSON the model sent. Keys we do not model
//! are kept in `extra` and written back out unchanged.

pub mod display;
pub mod merge;
pub mod parser;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

pub use display::format_rubric_for_display;
pub use merge::merge_rubrics;
pub use parser::parse_rubric_json;

/// Benchmarks every rubric carries, null when the tutorial does not state them
pub const STANDARD_BENCHMARKS: [&str; 7] = [
    "feudal_age",
    "castle_age",
    "imperial_age",
    "second_tc",
    "third_tc",
    "villagers_at_10min",
    "villagers_at_castle",
];

pub const UNKNOWN: &str = "unknown";
pub const RUBRIC_VERSION: &str = "1.0";

/// Structured coaching rubric extracted from a tutorial
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rubric {
    #[serde(default, deserialize_with = "lenient::opt_text", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub archetype: String,
    #[serde(default, deserialize_with = "lenient::values")]
    pub civilizations: Vec<Value>,
    #[serde(default = "default_map_types", deserialize_with = "lenient::map_types")]
    pub map_types: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub phases: Vec<Phase>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub decision_points: Vec<DecisionPoint>,
    /// Free-form; usually `{"strong_against": [...], "weak_against": [...]}`
    #[serde(default = "empty_object", deserialize_with = "lenient::object_or_empty")]
    pub counters: Value,
    #[serde(default, deserialize_with = "lenient::values")]
    pub key_insights: Vec<Value>,
    #[serde(default)]
    pub benchmarks: Benchmarks,
    #[serde(default, deserialize_with = "lenient::opt_text", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text", skip_serializing_if = "Option::is_none")]
    pub video_title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text", skip_serializing_if = "Option::is_none")]
    pub video_author: Option<String>,
    /// Seconds, as reported by the downloader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<Value>,
    /// `{"extracted_at": ..., "version": "1.0"}`
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A phase of the build (e.g. "Dark Age", "Feudal push")
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub key_actions: Vec<KeyAction>,
    #[serde(default, deserialize_with = "lenient::values")]
    pub success_criteria: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub common_mistakes: Vec<CommonMistake>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "KeyActionRepr")]
pub struct KeyAction {
    pub action: String,
    pub timing: String,
    pub importance: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyActionRepr {
    Text(String),
    Full {
        #[serde(default, deserialize_with = "lenient::text")]
        action: String,
        #[serde(default, deserialize_with = "lenient::text")]
        timing: String,
        #[serde(default, deserialize_with = "lenient::text")]
        importance: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl From<KeyActionRepr> for KeyAction {
    fn from(repr: KeyActionRepr) -> Self {
        let (action, timing, importance, extra) = match repr {
            KeyActionRepr::Text(action) => (action, String::new(), String::new(), Map::new()),
            KeyActionRepr::Full { action, timing, importance, extra } => (action, timing, importance, extra),
            KeyActionRepr::Other(value) => (value_text(&value), String::new(), String::new(), Map::new()),
        };
        Self {
            action,
            timing,
            importance: if importance.is_empty() { "important".to_string() } else { importance },
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "CommonMistakeRepr")]
pub struct CommonMistake {
    pub mistake: String,
    /// Usually a sentence, sometimes a list of steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommonMistakeRepr {
    Text(String),
    Full {
        #[serde(default, deserialize_with = "lenient::text")]
        mistake: String,
        #[serde(default)]
        fix: Option<Value>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl From<CommonMistakeRepr> for CommonMistake {
    fn from(repr: CommonMistakeRepr) -> Self {
        match repr {
            CommonMistakeRepr::Text(mistake) => Self { mistake, fix: None, extra: Map::new() },
            CommonMistakeRepr::Full { mistake, fix, extra } => Self { mistake, fix, extra },
            CommonMistakeRepr::Other(value) => Self {
                mistake: value_text(&value),
                fix: None,
                extra: Map::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "DecisionPointRepr")]
pub struct DecisionPoint {
    pub trigger: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecisionPointRepr {
    Text(String),
    Full {
        #[serde(default, deserialize_with = "lenient::text")]
        trigger: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl From<DecisionPointRepr> for DecisionPoint {
    fn from(repr: DecisionPointRepr) -> Self {
        match repr {
            DecisionPointRepr::Text(trigger) => Self { trigger, extra: Map::new() },
            DecisionPointRepr::Full { trigger, extra } => Self { trigger, extra },
            DecisionPointRepr::Other(value) => Self {
                trigger: value_text(&value),
                extra: Map::new(),
            },
        }
    }
}

/// Benchmark name to value (seconds for timings, counts otherwise)
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Benchmarks(pub Map<String, Value>);

impl<'de> Deserialize<'de> for Benchmarks {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => {
                warn!("Ignoring benchmarks that are not an object: {}", other);
                Self::default()
            }
        })
    }
}

impl Benchmarks {
    /// Add any missing standard benchmark as null
    pub fn ensure_standard_keys(&mut self) {
        for key in STANDARD_BENCHMARKS {
            self.0.entry(key.to_string()).or_insert(Value::Null);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// A benchmark as whole seconds; accepts numbers, `"510"` and `"8:30"`
    pub fn seconds(&self, key: &str) -> Option<u64> {
        value_as_seconds(self.get(key)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

pub(crate) fn value_as_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            match s.split_once(':') {
                Some((mins, secs)) => Some(mins.trim().parse::<u64>().ok()? * 60 + secs.trim().parse::<u64>().ok()?),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

/// Free-form JSON as a line of text: strings verbatim, lists joined with
/// `", "`, anything else as compact JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Seconds as `M:SS`
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn default_map_types() -> Vec<Value> {
    vec![Value::from("any")]
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Rubric {
    /// Fill defaults the extraction prompt asks for but the LLM may omit
    pub fn apply_defaults(&mut self) {
        for field in [&mut self.title, &mut self.difficulty, &mut self.archetype] {
            if field.is_empty() {
                *field = UNKNOWN.to_string();
            }
        }
        self.benchmarks.ensure_standard_keys();
    }

    /// Stamp `_meta` with the extraction time
    pub fn stamp(&mut self) {
        self.meta = Some(json!({
            "extracted_at": chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "version": RUBRIC_VERSION,
        }));
    }
}

/// Generate the library id for a rubric from its title.
///
/// Lowercases, drops everything but ASCII letters, digits and whitespace,
/// joins words with `_` and keeps at most 50 characters. The author is
/// accepted for callers that know it but does not affect the id.
pub fn generate_rubric_id(title: &str, _author: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let id: String = cleaned.split_whitespace().collect::<Vec<_>>().join("_").chars().take(50).collect();

    if id.is_empty() {
        "untitled".to_string()
    } else {
        id
    }
}

pub(crate) mod lenient {
    use super::*;
    use serde::de::DeserializeOwned;

    /// Null as `T::default()`
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    fn value_to_text(value: Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Any scalar as text, null as empty
    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(value_to_text(Value::deserialize(deserializer)?))
    }

    /// Like `text`, but null stays `None`
    pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            other => Some(value_to_text(other)),
        })
    }

    fn into_list(value: Value) -> Vec<Value> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        }
    }

    /// A list of scalars as text; a lone scalar becomes a one-item list
    pub fn texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(into_list(Value::deserialize(deserializer)?).into_iter().map(value_to_text).collect())
    }

    /// A list of arbitrary JSON items, kept as sent; a lone value becomes a one-item list
    pub fn values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(into_list(Value::deserialize(deserializer)?))
    }

    /// Like `values`, but null means "any map"
    pub fn map_types<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(default_map_types());
        }
        Ok(into_list(value))
    }

    /// Any JSON kept as sent, null as `{}`
    pub fn object_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(if value.is_null() { empty_object() } else { value })
    }

    /// A list of `T`; items that cannot become a `T` are logged and dropped
    pub fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(into_list(Value::deserialize(deserializer)?)
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping malformed rubric item: {}", e);
                    None
                }
            })
            .collect())
    }
}
