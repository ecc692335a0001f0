//! Layered journey-record extraction.
//!
//! Turns semi-structured free text into a [`JourneyRecord`] using a
//! confidence ladder of sequential guarded passes:
//!
//! 1. **Heuristic pass** — explicit `key: value` lines (and an inline
//!    `score = N` scan). Any hit yields `confidence = heuristic`.
//! 2. **Fallback pass** — loose keyword-proximity guessing when the
//!    heuristic pass finds nothing. Yields `confidence = low`; when even
//!    that comes up empty, the record carries a note and a 400-character
//!    excerpt of the input for human review.
//! 3. **Refinement** — optional. When the caller supplies a completion
//!    callable and the record is low-confidence, a single strict-JSON
//!    prompt is sent to it; a parseable reply supersedes the record with
//!    `confidence = llm`. Every failure mode (callable error, missing
//!    braces, bad JSON) is swallowed and the low-confidence record stands.
//!
//! No input raises: malformed or empty text degrades to the
//! excerpt-bearing low-confidence record.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::{Confidence, JourneyRecord};

/// Maximum characters of input preserved in the no-data-found excerpt.
const EXCERPT_CHARS: usize = 400;

/// A synchronous text-completion callable: prompt in, reply out.
///
/// Implemented for any `Fn(&str) -> anyhow::Result<String>`. The core makes
/// exactly one call per refinement attempt and assumes nothing about
/// latency, determinism, or thread safety; callers wanting timeout or retry
/// wrap the callable itself.
pub trait Complete {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<F> Complete for F
where
    F: Fn(&str) -> anyhow::Result<String>,
{
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self(prompt)
    }
}

static KV_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<key>journey[_ ]?id|id|score|reason|solution|raison|raisonnement)\s*[:=]\s*(?P<val>.+)$",
    )
    .unwrap()
});

static INLINE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)score\s*[=:]\s*([-+]?[0-9]*\.?[0-9]+)").unwrap());

static FALLBACK_JOURNEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"journey[^0-9]{0,8}([0-9]{3,})").unwrap());

static FALLBACK_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"score[^0-9\-+]{0,6}([-+]?[0-9]*\.?[0-9]+)").unwrap());

// Deliberately loose: any short standalone numeric token qualifies as a
// score candidate, unrelated numbers included.
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([-+]?[0-9]*\.?[0-9]{1,3})\b").unwrap());

static REASON_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.\n]{0,200}(reason|because|raison)[^.\n]{0,200})").unwrap()
});

static SOLUTION_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^.\n]{0,200}(solution|fix|recommend|recommendation|proposed)[^.\n]{0,200})")
        .unwrap()
});

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Fast deterministic pass over explicit `key: value` / `key = value` lines.
///
/// Key aliasing: keys containing `journey` (or exactly `id`) populate
/// `journey_id`, keys containing `score` populate `score` (later lines win
/// for both), while `reason`/`raison` and `solution` keep the first match.
/// When no `score` line matched, the whole text is scanned for an inline
/// `score = <number>` as a secondary source.
///
/// Returns `None` when no pair was found anywhere, triggering the fallback
/// pass.
fn heuristic_extract(text: &str) -> Option<JourneyRecord> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return None;
    }

    let mut journey_id: Option<String> = None;
    let mut score: Option<String> = None;
    let mut reason: Option<String> = None;
    let mut solution: Option<String> = None;

    for line in lines {
        let Some(caps) = KV_LINE.captures(line) else {
            continue;
        };
        let key = caps["key"].to_lowercase();
        let val = caps["val"].trim().to_string();
        if key.contains("journey") || key == "id" {
            journey_id = Some(val);
        } else if key.contains("score") {
            score = Some(val);
        } else if key.contains("reason") || key.contains("raison") {
            reason.get_or_insert(val);
        } else if key.contains("solution") {
            solution.get_or_insert(val);
        }
    }

    if score.is_none() {
        if let Some(caps) = INLINE_SCORE.captures(text) {
            score = Some(caps[1].to_string());
        }
    }

    if journey_id.is_none() && score.is_none() && reason.is_none() && solution.is_none() {
        return None;
    }

    Some(JourneyRecord {
        journey_id,
        score,
        reason,
        solution,
        ..JourneyRecord::empty(Confidence::Heuristic)
    })
}

/// Conservative keyword-proximity guesser used when the heuristic pass
/// finds nothing. Picks short spans near likely keywords rather than
/// inventing values.
fn fallback_extract(text: &str) -> JourneyRecord {
    let lower = text.to_lowercase();

    // Journey id: a run of 3+ digits shortly after the word "journey".
    let journey_id = FALLBACK_JOURNEY
        .captures(&lower)
        .map(|c| c[1].to_string());

    // Score: the nearest number after "score", else any short standalone
    // numeric token anywhere in the text.
    let score = FALLBACK_SCORE
        .captures(&lower)
        .map(|c| c[1].to_string())
        .or_else(|| BARE_NUMBER.captures(&lower).map(|c| c[1].to_string()));

    // Sentence fragments (bounded by '.' or newline) around cause/remedy
    // keywords, searched case-insensitively on the original text.
    let reason = REASON_FRAGMENT
        .captures(text)
        .map(|c| c[1].trim().to_string());
    let solution = SOLUTION_FRAGMENT
        .captures(text)
        .map(|c| c[1].trim().to_string());

    JourneyRecord {
        journey_id,
        score,
        reason,
        solution,
        ..JourneyRecord::empty(Confidence::Low)
    }
}

/// Extract journey information from arbitrary text.
///
/// Runs the heuristic pass, then the fallback pass, then (only when the
/// result is low-confidence and `completion` was supplied) a single LLM
/// refinement attempt whose successful result supersedes the fallback
/// record entirely. The returned record is always validated
/// ([`JourneyRecord::normalize`]) and this function never fails: the worst
/// case is an all-null low-confidence record carrying an input excerpt.
pub fn extract_journey_info(text: &str, completion: Option<&dyn Complete>) -> JourneyRecord {
    if let Some(rec) = heuristic_extract(text) {
        return rec.normalize();
    }

    let mut rec = fallback_extract(text);
    let found_any = rec.journey_id.is_some()
        || rec.score.is_some()
        || rec.reason.is_some()
        || rec.solution.is_some();

    if !found_any {
        rec.note = Some("no structured data found; see excerpt".to_string());
        rec.excerpt = Some(text.trim().chars().take(EXCERPT_CHARS).collect());
    }
    let rec = rec.normalize();

    if let Some(complete) = completion {
        if let Some(refined) = refine_extraction(text, complete) {
            return refined.normalize();
        }
    }

    rec
}

/// Build the fixed refinement instruction for a given input text.
///
/// Exposed separately (with [`parse_refinement`]) so async callers can
/// drive the completion call on their own runtime.
pub fn refinement_prompt(text: &str) -> String {
    format!(
        "You are a precise data extractor. Given the following text, extract exactly the fields \
         'journey_id', 'score', 'reason', 'solution'. Return only valid JSON with these keys \
         (use null when unknown). Do not add any explanation.\n\n\
         TEXT:\n{text}\n\n\
         Output JSON example: {{\n  \"journey_id\": null,\n  \"score\": null,\n  \"reason\": null,\n  \"solution\": null\n}}"
    )
}

/// Parse a completion reply into an LLM-confidence record.
///
/// Takes the first (greedy) brace-delimited span of the reply, parses it as
/// a JSON object, and projects it onto exactly the four known fields —
/// anything extra the model added is ignored. Numeric field values are
/// rendered to their string form. Returns `None` for replies without a
/// parseable object.
pub fn parse_refinement(reply: &str) -> Option<JourneyRecord> {
    let span = JSON_OBJECT.find(reply)?;
    let value: serde_json::Value = serde_json::from_str(span.as_str()).ok()?;
    let obj = value.as_object()?;

    Some(JourneyRecord {
        journey_id: field_as_string(obj.get("journey_id")),
        score: field_as_string(obj.get("score")),
        reason: field_as_string(obj.get("reason")),
        solution: field_as_string(obj.get("solution")),
        ..JourneyRecord::empty(Confidence::Llm)
    })
}

fn field_as_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Refine an extraction with a single call to the supplied completion
/// callable.
///
/// Returns `None` (never an error) when the callable fails or its reply
/// cannot be parsed. The result is not yet normalized; callers run
/// [`JourneyRecord::normalize`] before returning it.
pub fn refine_extraction(text: &str, completion: &dyn Complete) -> Option<JourneyRecord> {
    let reply = completion.complete(&refinement_prompt(text)).ok()?;
    parse_refinement(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(reply: &str) -> impl Fn(&str) -> anyhow::Result<String> {
        let reply = reply.to_string();
        move |_prompt: &str| Ok(reply.clone())
    }

    #[test]
    fn test_heuristic_extraction() {
        let text = "JourneyId: 12345\nScore: 2.5\nReason: On-time performance improved.\nSolution: Keep current setup.";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.journey_id.as_deref(), Some("12345"));
        assert_eq!(rec.score.as_deref(), Some("2.5"));
        assert_eq!(rec.score_numeric, Some(2.5));
        assert!(rec.reason.as_deref().unwrap().contains("improved"));
        assert!(rec.solution.as_deref().unwrap().contains("Keep"));
        assert_eq!(rec.confidence, Confidence::Heuristic);
        assert_eq!(rec.note, None);
    }

    #[test]
    fn test_heuristic_accepts_equals_and_mixed_case() {
        let text = "journey_id = 777\nSCORE=-4.0";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.journey_id.as_deref(), Some("777"));
        assert_eq!(rec.score_numeric, Some(-4.0));
        assert_eq!(rec.confidence, Confidence::Heuristic);
    }

    #[test]
    fn test_heuristic_french_reason_key() {
        let text = "Id: 9\nRaison: retard important au départ";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.journey_id.as_deref(), Some("9"));
        assert!(rec.reason.as_deref().unwrap().contains("retard"));
        assert_eq!(rec.confidence, Confidence::Heuristic);
    }

    #[test]
    fn test_heuristic_duplicate_keys() {
        // journey_id takes the last line, reason keeps the first.
        let text = "Id: 1\nJourneyId: 2\nReason: first cause\nReason: second cause";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.journey_id.as_deref(), Some("2"));
        assert_eq!(rec.reason.as_deref(), Some("first cause"));
    }

    #[test]
    fn test_heuristic_inline_score_secondary_source() {
        let text = "JourneyId: 55\nThe computed score = -2.5 for this run";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.score.as_deref(), Some("-2.5"));
        assert_eq!(rec.score_numeric, Some(-2.5));
    }

    #[test]
    fn test_heuristic_single_field_is_enough() {
        let rec = extract_journey_info("score: 7", None);
        assert_eq!(rec.confidence, Confidence::Heuristic);
        assert_eq!(rec.score_numeric, Some(7.0));
        assert_eq!(rec.journey_id, None);
    }

    #[test]
    fn test_fallback_extraction() {
        let text = "The journey 789 had a severe issue. The reason was a late crew and delays. \
                    We recommend reassigning staff as a solution to limit future impacts.";
        let rec = extract_journey_info(text, None);
        assert_eq!(rec.confidence, Confidence::Low);
        assert_eq!(rec.journey_id.as_deref(), Some("789"));
        assert!(rec.reason.as_deref().unwrap().to_lowercase().contains("reason"));
        assert!(rec.solution.is_some());
        assert_eq!(rec.note, None);
    }

    #[test]
    fn test_fallback_short_journey_number_ignored() {
        // "42" is only two digits: the journey-id rule wants 3+, so it stays
        // unset even though the bare-number rule will still grab 42 as a
        // score candidate.
        let rec = extract_journey_info("Journey 42 had issues with crew.", None);
        assert_eq!(rec.confidence, Confidence::Low);
        assert_eq!(rec.journey_id, None);
        assert_eq!(rec.score.as_deref(), Some("42"));
    }

    #[test]
    fn test_empty_input() {
        let rec = extract_journey_info("   \n  \n", None);
        assert_eq!(rec.confidence, Confidence::Low);
        assert_eq!(rec.journey_id, None);
        assert_eq!(rec.score, None);
        assert_eq!(rec.reason, None);
        assert_eq!(rec.solution, None);
        assert!(rec.excerpt.is_some());
        assert!(rec.note.is_some());
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let text = "x".repeat(1000);
        let rec = extract_journey_info(&text, None);
        assert_eq!(rec.excerpt.as_deref().unwrap().chars().count(), 400);
    }

    #[test]
    fn test_refine_with_mock_completion() {
        let completion = ok(
            "Here is the JSON:\n{\"journey_id\": \"42\", \"score\": \"-1.5\", \"reason\": \"crew shortage\", \"solution\": \"reassign crew\"}",
        );
        let rec = refine_extraction("Journey 42 had issues with crew.", &completion).unwrap();
        assert_eq!(rec.journey_id.as_deref(), Some("42"));
        assert_eq!(rec.confidence, Confidence::Llm);
    }

    #[test]
    fn test_extractor_uses_llm_when_low_confidence() {
        let completion =
            ok(r#"{"journey_id":"42","score":"-1.5","reason":"crew shortage","solution":"reassign crew"}"#);
        let rec = extract_journey_info("Journey 42 had issues with crew.", Some(&completion));
        assert_eq!(rec.confidence, Confidence::Llm);
        assert_eq!(rec.score_numeric, Some(-1.5));
    }

    #[test]
    fn test_heuristic_hit_skips_refinement() {
        let completion = |_: &str| -> anyhow::Result<String> {
            panic!("completion must not be called on a heuristic hit")
        };
        let rec = extract_journey_info("Score: 1.0", Some(&completion));
        assert_eq!(rec.confidence, Confidence::Heuristic);
    }

    #[test]
    fn test_refinement_accepts_numeric_values() {
        let completion = ok(r#"{"journey_id": 42, "score": -1.5, "reason": null, "solution": null}"#);
        let rec = extract_journey_info("nothing useful here at all", Some(&completion));
        assert_eq!(rec.confidence, Confidence::Llm);
        assert_eq!(rec.journey_id.as_deref(), Some("42"));
        assert_eq!(rec.score_numeric, Some(-1.5));
    }

    #[test]
    fn test_refinement_failure_keeps_fallback_record() {
        let failing = |_: &str| -> anyhow::Result<String> { anyhow::bail!("model unavailable") };
        let rec = extract_journey_info("Journey 42 had issues with crew.", Some(&failing));
        assert_eq!(rec.confidence, Confidence::Low);
    }

    #[test]
    fn test_refinement_malformed_reply_keeps_fallback_record() {
        let no_json = ok("I could not produce any structured output, sorry.");
        let rec = extract_journey_info("Journey 42 had issues with crew.", Some(&no_json));
        assert_eq!(rec.confidence, Confidence::Low);

        let bad_json = ok("{this is not json}");
        let rec = extract_journey_info("Journey 42 had issues with crew.", Some(&bad_json));
        assert_eq!(rec.confidence, Confidence::Low);
    }

    #[test]
    fn test_refinement_ignores_extra_keys() {
        let completion =
            ok(r#"{"journey_id":"7","score":null,"reason":null,"solution":null,"comment":"extra"}"#);
        let rec = refine_extraction("text", &completion).unwrap();
        assert_eq!(rec.journey_id.as_deref(), Some("7"));
        let json = serde_json::to_value(rec.normalize()).unwrap();
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let text = "JourneyId: 98765\nScore: -4.2\nReason: Excessive delay at origin.\nSolution: Replan connection.";
        let rec = extract_journey_info(text, None);
        let json = serde_json::to_string(&rec).unwrap();
        let back: crate::record::JourneyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
