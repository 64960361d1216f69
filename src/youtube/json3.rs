//! YouTube `json3` subtitle parsing into timestamped plain text

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    segs: Option<Vec<Json3Segment>>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Format milliseconds as `M:SS`
pub fn format_timestamp(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Convert a json3 document into `[M:SS] text` lines
pub fn parse_json3(content: &str) -> Result<String> {
    let document: Json3Document = serde_json::from_str(content)?;

    let lines: Vec<String> = document
        .events
        .iter()
        .filter_map(|event| {
            let segs = event.segs.as_ref()?;
            let text: String = segs.iter().map(|seg| seg.utf8.as_str()).collect();
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(format!("[{}] {}", format_timestamp(event.start_ms), text))
            }
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Read and parse a json3 subtitle file
pub async fn parse_json3_file(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_json3(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "0:00");
        assert_eq!(format_timestamp(65_999), "1:05");
        assert_eq!(format_timestamp(3_600_000), "60:00");
    }

    #[test]
    fn test_parse_json3_events() {
        let content = r#"{
            "wireMagic": "pb3",
            "events": [
                {"tStartMs": 0, "dDurationMs": 2000, "id": 1},
                {"tStartMs": 1200, "segs": [{"utf8": "Build "}, {"utf8": "villagers", "tOffsetMs": 300}]},
                {"tStartMs": 5000, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 95000, "segs": [{"utf8": " click up to feudal "}]},
                {"segs": [{"acAsrConf": 0}]}
            ]
        }"#;

        let text = parse_json3(content).unwrap();
        assert_eq!(text, "[0:01] Build villagers\n[1:35] click up to feudal");
    }

    #[test]
    fn test_parse_json3_rejects_garbage() {
        assert!(parse_json3("WEBVTT\n\n00:00.000 --> 00:01.000").is_err());
        assert_eq!(parse_json3("{}").unwrap(), "");
    }

    #[tokio::test]
    async fn test_parse_json3_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.en.json3");
        tokio::fs::write(&path, r#"{"events":[{"tStartMs":61000,"segs":[{"utf8":"scout"}]}]}"#)
            .await
            .unwrap();

        assert_eq!(parse_json3_file(&path).await.unwrap(), "[1:01] scout");
    }
}
