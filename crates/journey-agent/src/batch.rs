//! Batch extraction over JSONL input.
//!
//! Reads one JSON object per input line, runs the journey extractor over
//! the chosen text, and writes one `{"source_id": ..., "extracted": ...}`
//! object per output line, producing the file `GET /api/journeys` serves.
//!
//! The analyzed text is the `--text-field` value when given; otherwise all
//! scalar values of the row are concatenated, so loosely structured
//! exports still extract.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use journey_agent_core::extract::extract_journey_info;

pub fn run_batch(input: &Path, output: &Path, text_field: Option<&str>) -> Result<()> {
    let in_file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let out_file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;
    let mut writer = BufWriter::new(out_file);

    let mut processed = 0u64;
    let mut skipped = 0u64;

    for (line_no, line) in std::io::BufReader::new(in_file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let row: Value = match serde_json::from_str(&line) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => {
                tracing::warn!(line = line_no + 1, "skipping unparsable input line");
                skipped += 1;
                continue;
            }
        };

        let payload = extract_row(&row, text_field);
        serde_json::to_writer(&mut writer, &payload)?;
        writer.write_all(b"\n")?;
        processed += 1;
    }

    writer.flush()?;

    println!("batch {} -> {}", input.display(), output.display());
    println!("  records extracted: {}", processed);
    if skipped > 0 {
        println!("  lines skipped: {}", skipped);
    }
    println!("ok");

    Ok(())
}

/// Extract one input row into its output payload.
fn extract_row(row: &Value, text_field: Option<&str>) -> Value {
    let text = row_text(row, text_field);
    let record = extract_journey_info(&text, None);

    // Carry the row's own identifier when it has one.
    let source_id = row
        .get("id")
        .or_else(|| row.get("journey_id"))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null);

    serde_json::json!({
        "source_id": source_id,
        "extracted": record,
    })
}

/// The text to analyze: a named field, or every scalar value joined.
fn row_text(row: &Value, text_field: Option<&str>) -> String {
    if let Some(field) = text_field {
        if let Some(value) = row.get(field) {
            return scalar_text(value).unwrap_or_default();
        }
    }

    row.as_object()
        .map(|map| {
            map.values()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_batch_extracts_each_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out/journeys.jsonl");
        fs::write(
            &input,
            concat!(
                "{\"id\":\"r1\",\"description\":\"JourneyId: 111\\nScore: 1.5\\nReason: ok\"}\n",
                "{\"id\":\"r2\",\"description\":\"nothing to see\"}\n",
                "garbage line\n",
            ),
        )
        .unwrap();

        run_batch(&input, &output, Some("description")).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let rows: Vec<Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["source_id"], "r1");
        assert_eq!(rows[0]["extracted"]["journey_id"], "111");
        assert_eq!(rows[0]["extracted"]["confidence"], "heuristic");
        assert_eq!(rows[1]["extracted"]["confidence"], "low");
    }

    #[test]
    fn test_row_text_concatenates_scalars_without_field() {
        let row: Value = serde_json::from_str(
            r#"{"journey_id": 777, "note": "Score: 2.0", "nested": {"x": 1}, "empty": ""}"#,
        )
        .unwrap();
        let text = row_text(&row, None);
        assert!(text.contains("777"));
        assert!(text.contains("Score: 2.0"));
        assert!(!text.contains("nested"));
    }

    #[test]
    fn test_source_id_falls_back_to_journey_id() {
        let row: Value = serde_json::from_str(r#"{"journey_id": 777, "text": "x"}"#).unwrap();
        let payload = extract_row(&row, Some("text"));
        assert_eq!(payload["source_id"], 777);
    }

    #[test]
    fn test_missing_input_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = run_batch(
            &dir.path().join("absent.jsonl"),
            &dir.path().join("out.jsonl"),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to open input"));
    }
}
