//! Rubric library: one pretty-printed JSON file per rubric, named by id

use crate::error::{CoachError, Result};
use crate::rubric::{format_clock, generate_rubric_id, value_text, Rubric};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A rubric loaded from the library together with its file name
#[derive(Debug, Clone)]
pub struct StoredRubric {
    pub rubric: Rubric,
    pub file_name: String,
}

/// Directory-backed rubric store
#[derive(Debug, Clone)]
pub struct RubricLibrary {
    dir: PathBuf,
}

impl RubricLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Assign the rubric its id and write it to `output` or `<dir>/<id>.json`
    pub fn save(&self, rubric: &mut Rubric, output: Option<&Path>) -> Result<PathBuf> {
        let title = if rubric.title.is_empty() { "untitled" } else { rubric.title.as_str() };
        let author = rubric.video_author.as_deref().unwrap_or("unknown");
        let rubric_id = generate_rubric_id(title, author);
        rubric.id = Some(rubric_id.clone());

        let path = match output {
            Some(path) => path.to_path_buf(),
            None => {
                std::fs::create_dir_all(&self.dir)?;
                self.dir.join(format!("{}.json", rubric_id))
            }
        };

        let json = serde_json::to_string_pretty(rubric)?;
        std::fs::write(&path, json)?;

        info!("✅ Saved rubric to: {}", path.display());
        Ok(path)
    }

    /// Load a rubric by exact id, falling back to the first file whose name
    /// contains `rubric_id` (case-insensitive)
    pub fn load(&self, rubric_id: &str) -> Result<Rubric> {
        let exact = self.dir.join(format!("{}.json", rubric_id));
        let path = if exact.is_file() {
            exact
        } else {
            let needle = rubric_id.to_lowercase();
            self.json_files()
                .into_iter()
                .find(|path| {
                    path.file_stem()
                        .map(|stem| stem.to_string_lossy().to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .ok_or_else(|| CoachError::RubricNotFound(rubric_id.to_string()))?
        };

        debug!("Loading rubric from {}", path.display());
        read_rubric(&path)
    }

    /// Load every rubric in the library, skipping unreadable files
    pub fn load_all(&self) -> Vec<StoredRubric> {
        self.json_files()
            .into_iter()
            .filter_map(|path| match read_rubric(&path) {
                Ok(rubric) => Some(StoredRubric {
                    rubric,
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                }),
                Err(e) => {
                    warn!("Failed to load {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }

    fn json_files(&self) -> Vec<PathBuf> {
        if !self.dir.is_dir() {
            return Vec::new();
        }

        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

fn read_rubric(path: &Path) -> Result<Rubric> {
    let content = std::fs::read_to_string(path).map_err(|source| CoachError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Keep rubrics whose archetype, title or id contains `keyword`
pub fn filter_rubrics(rubrics: Vec<StoredRubric>, keyword: &str) -> Vec<StoredRubric> {
    let keyword = keyword.to_lowercase();
    rubrics
        .into_iter()
        .filter(|stored| {
            let r = &stored.rubric;
            r.archetype.to_lowercase().contains(&keyword)
                || r.title.to_lowercase().contains(&keyword)
                || r.id.as_deref().unwrap_or_default().to_lowercase().contains(&keyword)
        })
        .collect()
}

const EMPTY_LIBRARY: &str = "No rubrics found. Extract some with `rubric-coach extract`!";

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn or_unknown(text: &str) -> &str {
    if text.is_empty() {
        "unknown"
    } else {
        text
    }
}

/// One row per rubric: id, difficulty, archetype, castle time, phase count
pub fn render_table(rubrics: &[StoredRubric]) -> String {
    if rubrics.is_empty() {
        return EMPTY_LIBRARY.to_string();
    }

    let mut lines = vec![
        format!(
            "{:<30} {:<12} {:<20} {:<10} {:<8}",
            "ID", "Difficulty", "Archetype", "FC Time", "Phases"
        ),
        "-".repeat(90),
    ];

    for stored in rubrics {
        let r = &stored.rubric;
        let fc_time = r
            .benchmarks
            .seconds("castle_age")
            .filter(|s| *s > 0)
            .map(format_clock)
            .unwrap_or_else(|| "N/A".to_string());

        lines.push(format!(
            "{:<30} {:<12} {:<20} {:<10} {:<8}",
            truncate(r.id.as_deref().unwrap_or("unknown"), 28),
            truncate(or_unknown(&r.difficulty), 10),
            truncate(or_unknown(&r.archetype), 18),
            fc_time,
            r.phases.len()
        ));
    }

    lines.push(String::new());
    lines.push(format!("Total: {} rubric(s)", rubrics.len()));
    lines.join("\n")
}

fn joined(values: &[Value]) -> String {
    values.iter().map(value_text).collect::<Vec<_>>().join(", ")
}

/// Multi-line description of every rubric
pub fn render_detailed(rubrics: &[StoredRubric]) -> String {
    if rubrics.is_empty() {
        return EMPTY_LIBRARY.to_string();
    }

    let mut lines = Vec::new();
    for (i, stored) in rubrics.iter().enumerate() {
        let r = &stored.rubric;
        let title = if r.title.is_empty() { "Untitled" } else { r.title.as_str() };

        lines.push(String::new());
        lines.push("=".repeat(60));
        lines.push(format!("#{}: {}", i + 1, title));
        lines.push(format!("   ID: {}", r.id.as_deref().unwrap_or("unknown")));
        lines.push(format!("   File: {}", stored.file_name));
        lines.push(String::new());
        lines.push(format!("   Difficulty: {}", or_unknown(&r.difficulty)));
        lines.push(format!("   Archetype: {}", or_unknown(&r.archetype)));

        if !r.civilizations.is_empty() {
            lines.push(format!("   Civilizations: {}", joined(&r.civilizations)));
        }
        if !r.map_types.is_empty() {
            lines.push(format!("   Map Types: {}", joined(&r.map_types)));
        }

        if let Some(castle) = r.benchmarks.seconds("castle_age").filter(|s| *s > 0) {
            lines.push(String::new());
            lines.push("   Benchmarks:".to_string());
            if let Some(feudal) = r.benchmarks.seconds("feudal_age").filter(|s| *s > 0) {
                lines.push(format!("     Feudal: {}", format_clock(feudal)));
            }
            lines.push(format!("     Castle: {}", format_clock(castle)));
        }

        if !r.phases.is_empty() {
            lines.push(String::new());
            lines.push(format!("   Phases ({}):", r.phases.len()));
            for phase in &r.phases {
                let name = if phase.name.is_empty() { "Phase" } else { phase.name.as_str() };
                lines.push(format!(
                    "     • {} ({} actions, {} mistakes)",
                    name,
                    phase.key_actions.len(),
                    phase.common_mistakes.len()
                ));
            }
        }

        if let Some(source) = r.source_url.as_deref().filter(|s| !s.is_empty()) {
            lines.push(String::new());
            lines.push(format!("   Source: {}", source));
        }
    }

    lines.join("\n").trim_end().to_string()
}
