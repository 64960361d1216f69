use super::Rubric;
use crate::error::{preview, CoachError, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

const PREVIEW_CHARS: usize = 500;

fn json_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("valid json fence regex"))
}

fn plain_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```\n(.*?)\n```").expect("valid fence regex"))
}

/// Pull the JSON payload out of an LLM reply, unwrapping a ```json (or bare
/// ```) fenced block when present.
pub fn extract_json_block(content: &str) -> &str {
    let fence = if content.contains("```json") {
        Some(json_fence())
    } else if content.contains("```") {
        Some(plain_fence())
    } else {
        None
    };

    fence
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map_or(content, |m| m.as_str())
        .trim()
}

/// Parse an LLM reply into a validated rubric with defaults filled in and
/// `_meta` stamped.
pub fn parse_rubric_json(content: &str) -> Result<Rubric> {
    let payload = extract_json_block(content);

    let value: Value = serde_json::from_str(payload).map_err(|source| CoachError::InvalidLlmJson {
        source,
        preview: preview(payload, PREVIEW_CHARS),
    })?;
    if !value.is_object() {
        return Err(CoachError::InvalidRubric(format!(
            "expected a JSON object, got {}",
            preview(&value.to_string(), 80)
        )));
    }
    let mut rubric: Rubric = serde_json::from_value(value).map_err(|e| CoachError::InvalidRubric(e.to_string()))?;

    rubric.apply_defaults();
    rubric.stamp();

    debug!(
        "Parsed rubric '{}' with {} phases, {} decision points",
        rubric.title,
        rubric.phases.len(),
        rubric.decision_points.len()
    );

    Ok(rubric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{RUBRIC_VERSION, STANDARD_BENCHMARKS, UNKNOWN};

    #[test]
    fn test_extract_json_block_variants() {
        assert_eq!(extract_json_block("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(
            extract_json_block("Here you go:\n```json\n{\"a\": 1}\n```\nEnjoy"),
            "{\"a\": 1}"
        );
        assert_eq!(extract_json_block("```\n{\"b\": 2}\n```"), "{\"b\": 2}");
        // fence without the expected newlines is left alone
        assert_eq!(extract_json_block("```json{\"a\": 1}```"), "```json{\"a\": 1}```");
    }

    #[test]
    fn test_parse_fills_defaults() {
        let rubric = parse_rubric_json(
            r#"```json
{"title": "Fast Castle", "phases": [{"name": "Dark Age", "key_actions": [{"action": "6 on sheep"}]}]}
```"#,
        )
        .unwrap();

        assert_eq!(rubric.title, "Fast Castle");
        assert_eq!(rubric.difficulty, UNKNOWN);
        assert_eq!(rubric.archetype, UNKNOWN);
        assert_eq!(rubric.map_types, vec!["any"]);
        assert!(rubric.civilizations.is_empty());
        assert_eq!(rubric.counters, serde_json::json!({}));
        assert_eq!(rubric.phases[0].key_actions[0].importance, "important");
        assert!(rubric.phases[0].success_criteria.is_empty());
        for key in STANDARD_BENCHMARKS {
            assert!(rubric.benchmarks.0[key].is_null());
        }

        let meta = rubric.meta.unwrap();
        assert_eq!(meta["version"], RUBRIC_VERSION);
        assert!(meta["extracted_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_invalid_json_reports_preview() {
        let garbage = format!("Sorry, I cannot help. {}", "x".repeat(1000));
        let err = parse_rubric_json(&garbage).unwrap_err();

        match &err {
            CoachError::InvalidLlmJson { preview, .. } => {
                assert_eq!(preview.chars().count(), 500);
                assert!(preview.starts_with("Sorry"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Invalid JSON in LLM response"));
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        let err = parse_rubric_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CoachError::InvalidRubric(_)));
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_parse_accepts_loosely_shaped_objects() {
        let rubric = parse_rubric_json(
            r#"{"title": "Pit Mine", "counters": ["Spearmen"], "key_insights": [{"tip": "Wall gold"}],
                "phases": [{"name": "Feudal", "key_actions": {"action": "Pit mine"},
                            "common_mistakes": [{"mistake": "Idle", "fix": ["Queue vills"]}]}],
                "benchmarks": "fast"}"#,
        )
        .unwrap();

        assert_eq!(rubric.counters, serde_json::json!(["Spearmen"]));
        assert_eq!(rubric.key_insights[0]["tip"], "Wall gold");
        assert_eq!(rubric.phases[0].key_actions[0].action, "Pit mine");
        assert!(rubric.benchmarks.0["feudal_age"].is_null());
    }
}
