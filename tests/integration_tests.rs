use anyhow::anyhow;
use async_trait::async_trait;
use rubric_coach::chunking::chunk_transcript;
use rubric_coach::evaluation::{format_game_summary, EvaluationOutcome};
use rubric_coach::library::{filter_rubrics, render_table};
use rubric_coach::llm::{ChatMessage, CompletionOptions, LLMResponse, Usage};
use rubric_coach::{
    CoachError, ExtractionSettings, GameData, GameEvaluator, LLMProvider, Rubric, RubricExtractor,
    RubricLibrary, TranscriptSource, VideoMetadata, LLM,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

type Calls = Arc<Mutex<Vec<Vec<ChatMessage>>>>;

/// Replies from a script, then a fixed fallback once the script runs out
struct ScriptedLLM {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    fallback: String,
    calls: Calls,
}

impl ScriptedLLM {
    fn new(replies: Vec<anyhow::Result<String>>, fallback: &str) -> (Self, Calls) {
        let calls = Calls::default();
        let llm = Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            calls: calls.clone(),
        };
        (llm, calls)
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn chat(&self, messages: Vec<ChatMessage>, _options: &CompletionOptions) -> anyhow::Result<LLMResponse> {
        self.calls.lock().unwrap().push(messages);
        let reply = self.replies.lock().unwrap().pop_front();
        let content = match reply {
            Some(reply) => reply?,
            None => self.fallback.clone(),
        };
        Ok(LLMResponse {
            content,
            usage: Usage::default(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::OpenAI
    }
}

struct FixedSource {
    transcript: Option<String>,
}

#[async_trait]
impl TranscriptSource for FixedSource {
    async fn metadata(&self, url: &str) -> VideoMetadata {
        let mut metadata = VideoMetadata::unknown(url);
        metadata.title = "Fast Castle Guide".to_string();
        metadata.author = "Beasty".to_string();
        metadata.duration = 754;
        metadata
    }

    async fn transcript(&self, _url: &str) -> rubric_coach::Result<Option<String>> {
        Ok(self.transcript.clone())
    }
}

fn sample_transcript() -> String {
    (0..40)
        .map(|i| format!("[{}:{:02}] Keep making villagers and send them to gold, step {}", i / 60, i % 60, i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn settings() -> ExtractionSettings {
    ExtractionSettings {
        chunk_size: 800,
        overlap: 100,
        options: CompletionOptions::default(),
        retries: 0,
        retry_backoff: Duration::ZERO,
    }
}

fn extractor(transcript: Option<String>, llm: ScriptedLLM) -> RubricExtractor {
    RubricExtractor::new(
        Box::new(FixedSource { transcript }),
        Box::new(llm),
        "Extract the rubric.".to_string(),
        settings(),
    )
}

#[tokio::test]
async fn test_extract_merges_chunks_and_skips_failures() {
    let transcript = sample_transcript();
    let expected_chunks = chunk_transcript(&transcript, 800, 100).len();
    assert!(expected_chunks >= 3);

    let first = r#"```json
{"title": "Fast Castle", "difficulty": "intermediate", "archetype": "fast_castle",
 "phases": [{"name": "Dark Age", "key_actions": ["6 on sheep"]}],
 "benchmarks": {"feudal_age": 270}}
```"#;
    let rest = r#"{"title": "Other", "phases": [{"name": "Dark Age"}, {"name": "Feudal"}],
 "key_insights": ["Wall your gold"], "benchmarks": {"castle_age": 510}}"#;

    let (llm, calls) = ScriptedLLM::new(vec![Ok(first.to_string()), Ok("not json at all".to_string())], rest);
    let rubric = extractor(Some(transcript), llm).extract(VIDEO_URL, None).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), expected_chunks);

    assert_eq!(rubric.title, "Fast Castle");
    let phases: Vec<_> = rubric.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(phases, vec!["Dark Age", "Feudal"]);
    assert_eq!(rubric.phases[0].key_actions[0].action, "6 on sheep");
    assert_eq!(rubric.key_insights, vec!["Wall your gold"]);
    assert_eq!(rubric.benchmarks.seconds("feudal_age"), Some(270));
    assert_eq!(rubric.benchmarks.seconds("castle_age"), Some(510));
    assert!(!rubric.benchmarks.is_set("imperial_age"));

    assert_eq!(rubric.source_url.as_deref(), Some(VIDEO_URL));
    assert_eq!(rubric.video_title.as_deref(), Some("Fast Castle Guide"));
    assert_eq!(rubric.video_author.as_deref(), Some("Beasty"));
    assert_eq!(rubric.video_duration, Some(json!(754)));
    assert!(rubric.meta.is_some());
}

#[tokio::test]
async fn test_extract_sends_prompt_and_system_message() {
    let (llm, calls) = ScriptedLLM::new(Vec::new(), r#"{"title": "Short"}"#);
    let rubric = extractor(Some("[0:00] Hello".to_string()), llm)
        .extract(VIDEO_URL, Some("My Custom Title"))
        .await
        .unwrap();

    assert_eq!(rubric.title, "My Custom Title");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let messages = &calls[0];
    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.contains("extracting structured rubrics"));
    assert_eq!(
        messages[1].content,
        "Extract the rubric.\n\n## Transcript\n\n[0:00] Hello\n\n## Extracted Rubric (JSON):"
    );
}

#[tokio::test]
async fn test_extract_failures() {
    let (llm, _) = ScriptedLLM::new(Vec::new(), "{}");
    let err = extractor(None, llm).extract(VIDEO_URL, None).await.unwrap_err();
    assert!(matches!(err, CoachError::NoTranscript(_)));

    let (llm, _) = ScriptedLLM::new(Vec::new(), "{}");
    let err = extractor(Some("   ".to_string()), llm).extract(VIDEO_URL, None).await.unwrap_err();
    assert!(matches!(err, CoachError::NoTranscript(_)));

    let (llm, calls) = ScriptedLLM::new(Vec::new(), "{}");
    let err = extractor(Some("text".to_string()), llm)
        .extract("https://example.com/video", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::InvalidUrl(_)));
    assert!(calls.lock().unwrap().is_empty());

    let (llm, _) = ScriptedLLM::new(vec![Err(anyhow!("rate limited"))], "never used");
    let err = extractor(Some("[0:00] Hello".to_string()), llm)
        .extract(VIDEO_URL, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::ExtractionFailed));
}

#[tokio::test]
async fn test_extracted_rubric_round_trips_through_library() {
    let temp_dir = TempDir::new().unwrap();
    let library = RubricLibrary::new(temp_dir.path().join("rubric_library"));

    let (llm, _) = ScriptedLLM::new(
        Vec::new(),
        r#"{"title": "English 2-TC Boom", "archetype": "boom", "benchmarks": {"castle_age": 600}, "notes": "kept"}"#,
    );
    let mut rubric = extractor(Some("[0:00] Boom".to_string()), llm)
        .extract(VIDEO_URL, None)
        .await
        .unwrap();

    let path = library.save(&mut rubric, None).unwrap();
    assert_eq!(path, library.dir().join("english_2tc_boom.json"));
    assert_eq!(rubric.id.as_deref(), Some("english_2tc_boom"));

    let loaded = library.load("2TC").unwrap();
    assert_eq!(loaded, rubric);
    assert_eq!(loaded.extra["notes"], "kept");

    let all = library.load_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].file_name, "english_2tc_boom.json");
    assert_eq!(filter_rubrics(all.clone(), "BOOM").len(), 1);
    assert!(filter_rubrics(all.clone(), "rush").is_empty());
    assert!(render_table(&all).contains("10:00"));

    assert!(matches!(library.load("missing"), Err(CoachError::RubricNotFound(_))));
}

fn sample_game() -> GameData {
    serde_json::from_value(json!({
        "game": {"map": "Dry Arabia", "game_id": 182257348},
        "player": {"name": "Tigre", "civilization": "english", "result": "loss"},
        "opponent": {"name": "Rival", "civilization": "french"},
        "timings": {"castle_age": {"seconds": 655}}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_evaluate_game_against_rubric() {
    let reply = r#"{"adherence_score": 64, "overall_assessment": "Castle was late",
        "coaching_feedback": ["Cut the second scout"]}"#;
    let (llm, calls) = ScriptedLLM::new(vec![Err(anyhow!("timeout"))], reply);

    let options = CompletionOptions {
        temperature: 0.4,
        ..CompletionOptions::default()
    };
    let evaluator = GameEvaluator::new(Box::new(llm), options, 1, Duration::ZERO);

    let rubric = Rubric {
        title: "Fast Castle".to_string(),
        ..Rubric::default()
    };
    let game = sample_game();
    let outcome = evaluator.evaluate(&rubric, &game).await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1][0].content.contains("structured game evaluations"));
    assert!(calls[1][1].content.contains(&format_game_summary(&game)));
    assert!(calls[1][1].content.contains("\"title\": \"Fast Castle\""));

    match outcome {
        EvaluationOutcome::Structured(evaluation) => {
            assert_eq!(evaluation.adherence_score, Some(json!(64)));
            assert_eq!(evaluation.overall_assessment, "Castle was late");
        }
        other => panic!("expected structured evaluation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_evaluate_gives_up_after_retries() {
    let (llm, calls) = ScriptedLLM::new(vec![Err(anyhow!("down")), Err(anyhow!("still down"))], "{}");
    let evaluator = GameEvaluator::new(Box::new(llm), CompletionOptions::default(), 1, Duration::ZERO);

    let err = evaluator.evaluate(&Rubric::default(), &sample_game()).await.unwrap_err();

    assert!(matches!(err, CoachError::Llm(ref message) if message.contains("still down")));
    assert_eq!(calls.lock().unwrap().len(), 2);
}
