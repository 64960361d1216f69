use super::{format_clock, value_as_seconds, value_text, Rubric};

/// Age-up and town-center benchmarks are timings; `villagers_at_*` are counts
fn is_timing_key(key: &str) -> bool {
    key.ends_with("_age") || key.ends_with("_tc")
}

/// Render a rubric as Markdown for reading in a terminal
pub fn format_rubric_for_display(rubric: &Rubric) -> String {
    let mut lines = Vec::new();

    let title = if rubric.title.is_empty() { "Untitled Rubric" } else { rubric.title.as_str() };
    lines.push(format!("# {}", title));
    lines.push(format!("**Difficulty:** {}", rubric.difficulty));
    lines.push(format!("**Archetype:** {}", rubric.archetype));
    lines.push(String::new());

    if let Some(overview) = rubric.extra.get("overview").filter(|v| !v.is_null()) {
        lines.push("## Overview".to_string());
        lines.push(value_text(overview));
        lines.push(String::new());
    }

    if !rubric.benchmarks.0.is_empty() {
        lines.push("## Benchmarks".to_string());
        for (key, value) in rubric.benchmarks.iter().filter(|(_, v)| !v.is_null()) {
            let rendered = match value_as_seconds(value) {
                Some(seconds) if is_timing_key(key) => format_clock(seconds),
                _ => value_text(value),
            };
            lines.push(format!("- {}: {}", key, rendered));
        }
        lines.push(String::new());
    }

    if !rubric.phases.is_empty() {
        lines.push("## Phases".to_string());
        for phase in &rubric.phases {
            let name = if phase.name.is_empty() { "Phase" } else { phase.name.as_str() };
            lines.push(format!("\n### {}", name));
            let description = phase.description.as_ref().map(value_text).unwrap_or_default();
            if !description.is_empty() {
                lines.push(description);
            }

            if !phase.key_actions.is_empty() {
                lines.push("\n**Key Actions:**".to_string());
                for action in &phase.key_actions {
                    lines.push(format!("- {} ({})", action.action, action.timing));
                }
            }

            if !phase.success_criteria.is_empty() {
                lines.push("\n**Success Criteria:**".to_string());
                for criteria in &phase.success_criteria {
                    lines.push(format!("- ✅ {}", value_text(criteria)));
                }
            }

            if !phase.common_mistakes.is_empty() {
                lines.push("\n**Common Mistakes:**".to_string());
                for mistake in &phase.common_mistakes {
                    lines.push(format!("- ❌ {}", mistake.mistake));
                    let fix = mistake.fix.as_ref().map(value_text).unwrap_or_default();
                    if !fix.is_empty() {
                        lines.push(format!("  → Fix: {}", fix));
                    }
                }
            }
        }
    }

    lines.join("\n")
}
