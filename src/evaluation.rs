//! Game evaluation against a stored rubric
//!
//! Game exports come from an external stats backend and vary in shape, so
//! the types here only model what the summary and report need. Everything
//! else rides along in `extra`.

use crate::config::Config;
use crate::error::{CoachError, Result};
use crate::llm::{complete_with_retry, CompletionOptions, LLM};
use crate::rubric::lenient;
use crate::rubric::parser::extract_json_block;
use crate::rubric::{format_clock, Rubric};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const EVALUATION_SYSTEM_PROMPT: &str = "You are an expert AoE IV coach providing structured game evaluations.";
const RULE_WIDTH: usize = 60;
const BUILD_ORDER_PREVIEW: usize = 10;
const UNFINISHED: f64 = 9999.0;

/// Exported game data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub game: GameInfo,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub player: PlayerSummary,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub opponent: PlayerSummary,
    /// Per-age timing objects, e.g. `{"feudal_age": {"seconds": 290}}`
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub timings: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub build_order: Vec<BuildOrderItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civilization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apm: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_gathered: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildOrderItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub item_type: String,
    /// Completion times in seconds
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub finished: Vec<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameData {
    /// `timings.<age>.seconds`, if recorded
    pub fn age_seconds(&self, age: &str) -> Option<&Value> {
        self.timings
            .get(age)
            .and_then(|timing| timing.get("seconds"))
            .filter(|v| !v.is_null())
    }
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or("Unknown")
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load a game export from disk
pub fn load_game_data(path: &Path) -> Result<GameData> {
    let content = std::fs::read_to_string(path).map_err(|source| CoachError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Fetching games by id needs the stats backend, which this tool does not talk to
pub fn fetch_game_from_api(profile_id: &str, game_id: &str) -> Result<GameData> {
    Err(CoachError::GameFetchUnavailable {
        profile_id: profile_id.to_string(),
        game_id: game_id.to_string(),
    })
}

/// Condense a game export into the text block the coach prompt embeds
pub fn format_game_summary(game: &GameData) -> String {
    let player = &game.player;
    let opponent = &game.opponent;

    let age = |key: &str| match game.age_seconds(key) {
        Some(seconds) => format!("{}s", plain(seconds)),
        None => "N/A".to_string(),
    };
    let compact = |value: &Option<Value>| match value {
        Some(v) if !v.is_null() => v.to_string(),
        _ => "{}".to_string(),
    };

    let mut lines = vec![
        format!("Game: {}", or_unknown(&game.game.map)),
        format!(
            "Player: {} ({}) - {}",
            or_unknown(&player.name),
            or_unknown(&player.civilization),
            player.result.as_deref().filter(|r| !r.is_empty()).unwrap_or("unknown").to_uppercase()
        ),
        format!("Opponent: {} ({})", or_unknown(&opponent.name), or_unknown(&opponent.civilization)),
        format!(
            "APM: {}",
            player.apm.as_ref().filter(|v| !v.is_null()).map_or_else(|| "N/A".to_string(), plain)
        ),
        String::new(),
        "Age Up Timings:".to_string(),
        format!("  Feudal: {}", age("feudal_age")),
        format!("  Castle: {}", age("castle_age")),
        format!("  Imperial: {}", age("imperial_age")),
        String::new(),
        format!("Resources Gathered: {}", compact(&player.resources_gathered)),
        format!("Final Score: {}", compact(&player.final_score)),
    ];

    if !game.build_order.is_empty() {
        let mut items: Vec<&BuildOrderItem> = game.build_order.iter().collect();
        items.sort_by(|a, b| {
            let a = a.finished.first().copied().unwrap_or(UNFINISHED);
            let b = b.finished.first().copied().unwrap_or(UNFINISHED);
            a.total_cmp(&b)
        });

        lines.push(String::new());
        lines.push(format!("Key Build Order Items (first {}):", BUILD_ORDER_PREVIEW));
        for item in items.into_iter().take(BUILD_ORDER_PREVIEW) {
            let time = item.finished.first().copied().unwrap_or(0.0).max(0.0) as u64;
            let item_type = if item.item_type.is_empty() { "unknown" } else { item.item_type.as_str() };
            let id = if item.id.is_empty() { "unknown" } else { item.id.as_str() };
            lines.push(format!("  [{}] {}: {}", format_clock(time), item_type, id));
        }
    }

    lines.join("\n")
}

/// Coaching prompt comparing a game summary to a rubric
pub fn build_evaluation_prompt(rubric: &Rubric, summary: &str) -> Result<String> {
    let rubric_json = serde_json::to_string_pretty(rubric)?;

    Ok(format!(
        r#"You are an expert AoE IV coach. Evaluate this player's game against the provided rubric.

## Rubric
```json
{rubric_json}
```

## Game Data
{summary}

## Evaluation Task
Compare the player's game to the rubric and provide:
1. Overall adherence score (0-100)
2. Phase-by-phase analysis (what they did well, what deviated)
3. Specific timing comparisons vs benchmarks
4. Mistakes made (linked to rubric's common mistakes if applicable)
5. Actionable coaching feedback

Respond with JSON:
{{
  "adherence_score": 0-100,
  "overall_assessment": "brief summary",
  "phase_analysis": [
    {{
      "phase": "phase name",
      "score": 0-100,
      "what_went_well": ["..."],
      "deviations": ["..."],
      "benchmark_comparison": {{"benchmark": X, "actual": Y, "delta": Z}}
    }}
  ],
  "mistakes_observed": [
    {{
      "timestamp": "MM:SS or phase",
      "mistake": "description",
      "rubric_reference": "which common mistake this matches",
      "impact": "how this affected the game",
      "fix": "how to correct"
    }}
  ],
  "coaching_feedback": [
    "specific actionable advice"
  ]
}}
"#
    ))
}

/// Structured evaluation returned by the coach
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adherence_score: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub overall_assessment: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub phase_analysis: Vec<PhaseAnalysis>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub mistakes_observed: Vec<ObservedMistake>,
    #[serde(default, deserialize_with = "lenient::texts")]
    pub coaching_feedback: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseAnalysis {
    #[serde(default, deserialize_with = "lenient::text")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Value>,
    #[serde(default, deserialize_with = "lenient::texts")]
    pub what_went_well: Vec<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    pub deviations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_comparison: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservedMistake {
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub mistake: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub rubric_reference: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub impact: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub fix: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What the coach sent back: a structured evaluation, or the raw reply when
/// it was not valid JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EvaluationOutcome {
    Raw { raw_response: String },
    Structured(Evaluation),
}

/// Parse the coach reply, keeping the raw text when it is not an evaluation object
pub fn parse_evaluation(content: &str) -> EvaluationOutcome {
    match serde_json::from_str::<Evaluation>(extract_json_block(content)) {
        Ok(evaluation) => EvaluationOutcome::Structured(evaluation),
        Err(e) => {
            warn!("Failed to parse evaluation: {}", e);
            EvaluationOutcome::Raw {
                raw_response: content.to_string(),
            }
        }
    }
}

fn score_emoji(score: f64) -> &'static str {
    if score >= 80.0 {
        "🟢"
    } else if score >= 60.0 {
        "🟡"
    } else {
        "🔴"
    }
}

/// Render the evaluation report shown in the terminal
pub fn render_evaluation(outcome: &EvaluationOutcome, rubric: &Rubric, game: &GameData) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let player = game.player.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Player");
    let rubric_title = if rubric.title.is_empty() { "Unknown" } else { rubric.title.as_str() };

    let mut lines = vec![
        String::new(),
        rule.clone(),
        format!("🎮 Game Evaluation: {}", player),
        format!("📋 Rubric: {}", rubric_title),
        rule.clone(),
    ];

    match outcome {
        EvaluationOutcome::Raw { raw_response } => {
            lines.push("\n⚠️  Could not parse a structured evaluation. Raw response:".to_string());
            lines.push(raw_response.clone());
        }
        EvaluationOutcome::Structured(evaluation) => render_structured(evaluation, &mut lines),
    }

    lines.push(format!("\n{}", rule));
    lines.join("\n")
}

fn render_structured(evaluation: &Evaluation, lines: &mut Vec<String>) {
    if let Some(score) = evaluation.adherence_score.as_ref().and_then(|s| s.as_f64().map(|n| (s, n))) {
        lines.push(format!("\n{} Overall Score: {}/100", score_emoji(score.1), score.0));
    }

    lines.push("\n📊 Assessment:".to_string());
    let assessment = if evaluation.overall_assessment.is_empty() {
        "No assessment provided"
    } else {
        evaluation.overall_assessment.as_str()
    };
    lines.push(format!("  {}", assessment));

    if !evaluation.phase_analysis.is_empty() {
        lines.push("\n📈 Phase Analysis:".to_string());
        for phase in &evaluation.phase_analysis {
            let name = if phase.phase.is_empty() { "Phase" } else { phase.phase.as_str() };
            lines.push(format!("\n  {}:", name));
            let score = phase.score.as_ref().filter(|s| !s.is_null()).map_or_else(|| "N/A".to_string(), plain);
            lines.push(format!("    Score: {}/100", score));

            if !phase.what_went_well.is_empty() {
                lines.push("    ✅ Good:".to_string());
                lines.extend(phase.what_went_well.iter().map(|item| format!("       • {}", item)));
            }
            if !phase.deviations.is_empty() {
                lines.push("    ⚠️  Deviations:".to_string());
                lines.extend(phase.deviations.iter().map(|item| format!("       • {}", item)));
            }
        }
    }

    if !evaluation.mistakes_observed.is_empty() {
        lines.push("\n❌ Mistakes Observed:".to_string());
        for mistake in &evaluation.mistakes_observed {
            let timestamp = if mistake.timestamp.is_empty() { "?" } else { mistake.timestamp.as_str() };
            lines.push(format!("\n  [{}] {}", timestamp, mistake.mistake));
            if !mistake.rubric_reference.is_empty() {
                lines.push(format!("    📚 Matches: {}", mistake.rubric_reference));
            }
            if !mistake.impact.is_empty() {
                lines.push(format!("    💥 Impact: {}", mistake.impact));
            }
            if !mistake.fix.is_empty() {
                lines.push(format!("    🔧 Fix: {}", mistake.fix));
            }
        }
    }

    if !evaluation.coaching_feedback.is_empty() {
        lines.push("\n💡 Coaching Feedback:".to_string());
        lines.extend(evaluation.coaching_feedback.iter().map(|item| format!("  • {}", item)));
    }
}

/// Evaluation saved with `--output`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub rubric: Option<String>,
    pub game: Option<Value>,
    pub evaluation: EvaluationOutcome,
    pub player: Option<String>,
}

impl EvaluationRecord {
    pub fn new(rubric: &Rubric, game: &GameData, evaluation: EvaluationOutcome) -> Self {
        Self {
            rubric: rubric.id.clone(),
            game: game.game.game_id.clone(),
            evaluation,
            player: game.player.name.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 Saved evaluation to: {}", path.display());
        Ok(())
    }
}

/// Runs the coach prompt for one game against one rubric
pub struct GameEvaluator {
    llm: Box<dyn LLM>,
    options: CompletionOptions,
    retries: u32,
    retry_backoff: Duration,
}

impl GameEvaluator {
    pub fn new(llm: Box<dyn LLM>, options: CompletionOptions, retries: u32, retry_backoff: Duration) -> Self {
        Self {
            llm,
            options,
            retries,
            retry_backoff,
        }
    }

    pub fn from_config(llm: Box<dyn LLM>, config: &Config) -> Self {
        let options = CompletionOptions {
            temperature: config.evaluation.temperature,
            max_tokens: config.llm.max_tokens,
            json_mode: true,
        };
        Self::new(llm, options, config.llm.retries, config.llm.retry_backoff())
    }

    pub async fn evaluate(&self, rubric: &Rubric, game: &GameData) -> Result<EvaluationOutcome> {
        let prompt = build_evaluation_prompt(rubric, &format_game_summary(game))?;

        let response = complete_with_retry(
            self.llm.as_ref(),
            &prompt,
            Some(EVALUATION_SYSTEM_PROMPT),
            &self.options,
            self.retries,
            self.retry_backoff,
        )
        .await
        .map_err(|e| CoachError::Llm(e.to_string()))?;

        Ok(parse_evaluation(&response.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_game() -> GameData {
        serde_json::from_value(json!({
            "game": {"map": "Dry Arabia", "game_id": 182257348},
            "player": {
                "name": "Tigre",
                "civilization": "english",
                "result": "win",
                "apm": 87,
                "resources_gathered": {"food": 12000},
                "final_score": {"total": 9000}
            },
            "opponent": {"name": "Rival", "civilization": "french"},
            "timings": {"feudal_age": {"seconds": 290}, "castle_age": {"seconds": null}},
            "build_order": [
                {"id": "house", "type": "Building", "finished": [95, 300]},
                {"id": "villager", "type": "Unit", "finished": [20]},
                {"id": "scout", "type": "Unit"}
            ],
            "source": "aoe4world"
        }))
        .unwrap()
    }

    #[test]
    fn test_game_summary_lines() {
        let summary = format_game_summary(&sample_game());
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines[0], "Game: Dry Arabia");
        assert_eq!(lines[1], "Player: Tigre (english) - WIN");
        assert_eq!(lines[2], "Opponent: Rival (french)");
        assert_eq!(lines[3], "APM: 87");
        assert_eq!(lines[6], "  Feudal: 290s");
        assert_eq!(lines[7], "  Castle: N/A");
        assert_eq!(lines[8], "  Imperial: N/A");
        assert_eq!(lines[10], "Resources Gathered: {\"food\":12000}");
        assert_eq!(lines[11], "Final Score: {\"total\":9000}");
        assert_eq!(lines[13], "Key Build Order Items (first 10):");
        assert_eq!(&lines[14..], ["  [0:20] Unit: villager", "  [1:35] Building: house", "  [0:00] Unit: scout"]);
    }

    #[test]
    fn test_game_summary_defaults() {
        let summary = format_game_summary(&GameData::default());
        assert!(summary.starts_with("Game: Unknown\nPlayer: Unknown (Unknown) - UNKNOWN\n"));
        assert!(summary.contains("APM: N/A"));
        assert!(summary.ends_with("Final Score: {}"));
        assert!(!summary.contains("Build Order"));
    }

    #[test]
    fn test_game_data_keeps_unknown_keys() {
        let game = sample_game();
        assert_eq!(game.extra["source"], "aoe4world");
        let round_trip = serde_json::to_value(&game).unwrap();
        assert_eq!(round_trip["source"], "aoe4world");
    }

    #[test]
    fn test_load_game_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");
        std::fs::write(&path, r#"{"player": {"name": "Tigre"}, "build_order": null}"#).unwrap();

        let game = load_game_data(&path).unwrap();
        assert_eq!(game.player.name.as_deref(), Some("Tigre"));
        assert!(game.build_order.is_empty());

        let missing = load_game_data(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(CoachError::ReadFile { .. })));
    }

    #[test]
    fn test_fetch_game_names_export_command() {
        let err = fetch_game_from_api("17689761", "182257348").unwrap_err();
        assert!(err
            .to_string()
            .contains("curl http://localhost:8000/api/game/17689761/182257348 > game.json"));
    }

    #[test]
    fn test_evaluation_prompt_embeds_inputs() {
        let rubric = Rubric {
            title: "Fast Castle".to_string(),
            ..Rubric::default()
        };
        let prompt = build_evaluation_prompt(&rubric, "Game: Dry Arabia").unwrap();

        assert!(prompt.starts_with("You are an expert AoE IV coach."));
        assert!(prompt.contains("```json\n{\n  \"title\": \"Fast Castle\""));
        assert!(prompt.contains("## Game Data\nGame: Dry Arabia\n"));
        assert!(prompt.contains("\"adherence_score\": 0-100,"));
        assert!(prompt.contains("{\"benchmark\": X, \"actual\": Y, \"delta\": Z}"));
    }

    #[test]
    fn test_parse_evaluation_structured_and_raw() {
        let fenced = "```json\n{\"adherence_score\": 72, \"coaching_feedback\": [\"Wall earlier\"]}\n```";
        match parse_evaluation(fenced) {
            EvaluationOutcome::Structured(evaluation) => {
                assert_eq!(evaluation.adherence_score, Some(json!(72)));
                assert_eq!(evaluation.coaching_feedback, vec!["Wall earlier"]);
            }
            other => panic!("expected structured evaluation, got {:?}", other),
        }

        assert_eq!(
            parse_evaluation("not json"),
            EvaluationOutcome::Raw {
                raw_response: "not json".to_string()
            }
        );
        assert!(matches!(parse_evaluation("[1, 2]"), EvaluationOutcome::Raw { .. }));
    }

    #[test]
    fn test_render_evaluation_report() {
        let evaluation: Evaluation = serde_json::from_value(json!({
            "adherence_score": 85,
            "overall_assessment": "Clean fast castle",
            "phase_analysis": [{
                "phase": "Dark Age",
                "score": 90,
                "what_went_well": ["Constant villagers"],
                "deviations": ["Late second scout"]
            }],
            "mistakes_observed": [{
                "timestamp": "4:30",
                "mistake": "Idle TC",
                "rubric_reference": "Never idle the TC",
                "fix": "Queue 2 villagers"
            }],
            "coaching_feedback": ["Queue villagers"]
        }))
        .unwrap();
        let rubric = Rubric {
            title: "Fast Castle".to_string(),
            ..Rubric::default()
        };

        let report = render_evaluation(&EvaluationOutcome::Structured(evaluation), &rubric, &sample_game());

        assert!(report.contains("🎮 Game Evaluation: Tigre\n📋 Rubric: Fast Castle"));
        assert!(report.contains("🟢 Overall Score: 85/100"));
        assert!(report.contains("📊 Assessment:\n  Clean fast castle"));
        assert!(report.contains("\n  Dark Age:\n    Score: 90/100\n    ✅ Good:\n       • Constant villagers"));
        assert!(report.contains("    ⚠️  Deviations:\n       • Late second scout"));
        assert!(report.contains("  [4:30] Idle TC\n    📚 Matches: Never idle the TC\n    🔧 Fix: Queue 2 villagers"));
        assert!(!report.contains("💥"));
        assert!(report.contains("💡 Coaching Feedback:\n  • Queue villagers"));
        assert!(report.ends_with(&"=".repeat(60)));
    }

    #[test]
    fn test_render_score_bands() {
        let render = |score: Value| {
            let evaluation = Evaluation {
                adherence_score: Some(score),
                ..Evaluation::default()
            };
            render_evaluation(&EvaluationOutcome::Structured(evaluation), &Rubric::default(), &GameData::default())
        };

        assert!(render(json!(80)).contains("🟢 Overall Score: 80/100"));
        assert!(render(json!(60)).contains("🟡 Overall Score: 60/100"));
        assert!(render(json!(59.5)).contains("🔴 Overall Score: 59.5/100"));
        let text = render(json!("high"));
        assert!(!text.contains("Overall Score"));
        assert!(text.contains("No assessment provided"));
        assert!(text.contains("🎮 Game Evaluation: Player\n📋 Rubric: Unknown"));
    }

    #[test]
    fn test_record_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("eval.json");
        let rubric = Rubric {
            id: Some("fast_castle".to_string()),
            ..Rubric::default()
        };
        let outcome = EvaluationOutcome::Raw {
            raw_response: "oops".to_string(),
        };

        EvaluationRecord::new(&rubric, &sample_game(), outcome).save(&path).unwrap();

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["rubric"], "fast_castle");
        assert_eq!(saved["game"], 182257348);
        assert_eq!(saved["player"], "Tigre");
        assert_eq!(saved["evaluation"]["raw_response"], "oops");
    }
}
