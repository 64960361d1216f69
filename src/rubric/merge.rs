use super::Rubric;
use std::collections::HashSet;

/// Merge rubrics extracted from consecutive transcript chunks.
///
/// The first rubric wins for scalar fields. Later chunks contribute phases
/// (unique by name), key insights (unique by value), decision points (unique
/// by trigger) and any benchmark the merged rubric still has as null.
pub fn merge_rubrics(rubrics: Vec<Rubric>) -> Rubric {
    let mut iter = rubrics.into_iter();
    let Some(mut merged) = iter.next() else {
        return Rubric::default();
    };

    let mut phase_names: HashSet<String> = merged.phases.iter().map(|p| p.name.clone()).collect();
    let mut triggers: HashSet<String> = merged.decision_points.iter().map(|d| d.trigger.clone()).collect();

    for rubric in iter {
        for phase in rubric.phases {
            if phase_names.insert(phase.name.clone()) {
                merged.phases.push(phase);
            }
        }

        for insight in rubric.key_insights {
            if !merged.key_insights.contains(&insight) {
                merged.key_insights.push(insight);
            }
        }

        for (key, value) in rubric.benchmarks.0 {
            if !value.is_null() && !merged.benchmarks.is_set(&key) {
                merged.benchmarks.0.insert(key, value);
            }
        }

        for point in rubric.decision_points {
            if triggers.insert(point.trigger.clone()) {
                merged.decision_points.push(point);
            }
        }
    }

    merged
}
