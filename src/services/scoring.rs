// src/services/scoring.rs

use std::collections::HashMap;

use crate::models::attempt::SubmittedAnswer;

/// Correct-answer key for one scoring unit.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    pub unit_id: i64,
    pub points: i64,

    /// Texts of the options flagged correct. At least one by invariant.
    pub correct: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub score: i64,
    pub max_score: i64,

    /// Rounded to the nearest integer.
    pub percentage: i64,
}

/// Evaluates a quiz submission against the answer keys.
///
/// Units are all-or-nothing: a unit is awarded its full point value the
/// moment one correct option is present among the submission, even for a
/// multi-select with several correct options. No partial credit, no negative
/// scoring. Units with no submitted entry score zero; the maximum accumulates
/// every unit's point value regardless of what was submitted.
pub fn evaluate(keys: &[AnswerKey], submitted: &HashMap<i64, SubmittedAnswer>) -> ScoreOutcome {
    let mut score = 0;
    let mut max_score = 0;

    for key in keys {
        max_score += key.points;

        let Some(answer) = submitted.get(&key.unit_id) else {
            continue;
        };

        let hit = match answer {
            SubmittedAnswer::One(choice) => key.correct.iter().any(|c| c == choice),
            SubmittedAnswer::Many(choices) => {
                choices.iter().any(|choice| key.correct.contains(choice))
            }
        };

        if hit {
            score += key.points;
        }
    }

    let percentage = if max_score == 0 {
        0
    } else {
        ((score as f64 / max_score as f64) * 100.0).round() as i64
    };

    ScoreOutcome {
        score,
        max_score,
        percentage,
    }
}
