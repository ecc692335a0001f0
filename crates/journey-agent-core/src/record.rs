//! Journey record model and output validation.
//!
//! A [`JourneyRecord`] is constructed fresh per extracted text, passes
//! through [`JourneyRecord::normalize`] exactly once per extraction path,
//! and is serialized to JSON at the boundary. Records are never mutated
//! after they are returned.

use serde::{Deserialize, Serialize};

/// Provenance tag for an extracted record: which pass produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Explicit `key: value` lines matched.
    Heuristic,
    /// Loose keyword guessing, or nothing found at all.
    Low,
    /// Produced by LLM refinement of a low-confidence record.
    Llm,
}

/// Structured journey information extracted from free text.
///
/// `score` preserves the raw token as found in the text; `score_numeric`
/// is the parsed form and is `None` when the token is absent or not a
/// number. `note` and `excerpt` are populated only when extraction found
/// nothing and the record is returned for human review; they are omitted
/// from the JSON output otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyRecord {
    pub journey_id: Option<String>,
    pub score: Option<String>,
    pub score_numeric: Option<f64>,
    pub reason: Option<String>,
    pub solution: Option<String>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl JourneyRecord {
    /// An all-null record carrying only a confidence tag.
    pub fn empty(confidence: Confidence) -> Self {
        Self {
            journey_id: None,
            score: None,
            score_numeric: None,
            reason: None,
            solution: None,
            confidence,
            note: None,
            excerpt: None,
        }
    }

    /// Enforce the output invariants, regardless of which pass built the
    /// record.
    ///
    /// - Whitespace-only field values become `None`.
    /// - `score_numeric` is re-derived from `score` (trimmed float parse);
    ///   parse failure degrades to `None`, never an error.
    ///
    /// Normalizing an already-normalized record is a no-op.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        for field in [
            &mut self.journey_id,
            &mut self.score,
            &mut self.reason,
            &mut self.solution,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self.score_numeric = self
            .score
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok());
        self
    }
}
