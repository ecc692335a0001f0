//! HTTP tool and journeys server.
//!
//! Exposes the tool registry over JSON HTTP for agent frameworks and
//! serves the batch-extraction output for dashboards.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a registered tool by name |
//! | `GET`  | `/api/journeys` | Filtered/sorted batch-extraction records |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `tool_error` (500).
//!
//! All origins, methods, and headers are permitted (browser dashboards and
//! cross-origin tool calls).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::tools::{validate_params, ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
}

/// Start the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let registry = ToolRegistry::with_builtins();

    println!("Registered {} tools:", registry.len());
    for t in registry.tools() {
        println!("  POST /tools/{} — {}", t.name(), t.description());
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        tools: Arc::new(registry),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/api/journeys", get(handle_journeys))
        .layer(cors)
        .with_state(state);

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// Map tool execution errors onto HTTP statuses without a dedicated error
/// type on the `Tool` trait.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found") {
        not_found(format!("{}: {}", tool_name, msg))
    } else if msg.contains("must not be empty")
        || msg.contains("requires an embedding provider")
        || msg.contains("invalid")
    {
        bad_request(format!("{}: {}", tool_name, msg))
    } else {
        tool_error(format!("{}: {}", tool_name, msg))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.config.clone());
    let result = tool
        .execute(validated, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}

// ============ GET /api/journeys ============

#[derive(Debug, Default, Deserialize)]
struct JourneysQuery {
    /// Return the N highest-scoring records.
    top: Option<usize>,
    /// Return the N lowest-scoring records.
    bottom: Option<usize>,
    limit: Option<usize>,
    journey_id: Option<String>,
    min_confidence: Option<String>,
}

async fn handle_journeys(
    State(state): State<AppState>,
    Query(query): Query<JourneysQuery>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let path = &state.config.output.journeys;
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Ok(Json(Vec::new())),
    };

    let records = filter_journeys(&content, &query);
    Ok(Json(records))
}

/// Filter, sort, and truncate batch-extraction records.
///
/// Records are JSONL lines of `{"source_id": ..., "extracted": {...}}`;
/// unparsable lines are skipped. `top` sorts by numeric score descending,
/// `bottom` ascending; records without a numeric score sort last either
/// way.
fn filter_journeys(content: &str, query: &JourneysQuery) -> Vec<serde_json::Value> {
    let mut records: Vec<serde_json::Value> = content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    if let Some(ref min_confidence) = query.min_confidence {
        records.retain(|r| {
            r.pointer("/extracted/confidence")
                .and_then(|c| c.as_str())
                .is_some_and(|c| c == min_confidence)
        });
    }

    if let Some(ref journey_id) = query.journey_id {
        records.retain(|r| {
            let source_matches = r
                .get("source_id")
                .map(json_as_string)
                .is_some_and(|s| s == *journey_id);
            let extracted_matches = r
                .pointer("/extracted/journey_id")
                .map(json_as_string)
                .is_some_and(|s| s == *journey_id);
            source_matches || extracted_matches
        });
    }

    let score_of = |r: &serde_json::Value| -> Option<f64> {
        r.pointer("/extracted/score")
            .and_then(|s| match s {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
    };

    let mut result = if let Some(bottom) = query.bottom.filter(|&n| n > 0) {
        records.sort_by(|a, b| {
            let sa = score_of(a).unwrap_or(f64::INFINITY);
            let sb = score_of(b).unwrap_or(f64::INFINITY);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        });
        records.truncate(bottom);
        records
    } else {
        records.sort_by(|a, b| {
            let sa = score_of(a).unwrap_or(f64::NEG_INFINITY);
            let sb = score_of(b).unwrap_or(f64::NEG_INFINITY);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(top) = query.top.filter(|&n| n > 0) {
            records.truncate(top);
        }
        records
    };

    if let Some(limit) = query.limit.filter(|&n| n > 0) {
        result.truncate(limit);
    }

    result
}

/// Render a JSON scalar the way the original id comparison did (numbers
/// and strings compare equal to their textual form).
fn json_as_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jsonl() -> String {
        [
            r#"{"source_id":"1","extracted":{"journey_id":"1001","score":"2.5","confidence":"heuristic"}}"#,
            r#"{"source_id":"2","extracted":{"journey_id":"1002","score":"-3.4","confidence":"heuristic"}}"#,
            r#"{"source_id":"3","extracted":{"journey_id":null,"score":null,"confidence":"low"}}"#,
            "not json",
            r#"{"source_id":"4","extracted":{"journey_id":"1004","score":"0.1","confidence":"llm"}}"#,
        ]
        .join("\n")
    }

    #[test]
    fn test_filter_skips_unparsable_lines() {
        let records = filter_journeys(&sample_jsonl(), &JourneysQuery::default());
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn test_default_sort_is_score_descending_nulls_last() {
        let records = filter_journeys(&sample_jsonl(), &JourneysQuery::default());
        let ids: Vec<&str> = records
            .iter()
            .map(|r| r["source_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "4", "2", "3"]);
    }

    #[test]
    fn test_top_and_bottom() {
        let top = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                top: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["source_id"], "1");

        let bottom = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                bottom: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(bottom[0]["source_id"], "2");
    }

    #[test]
    fn test_journey_id_filter_matches_both_fields() {
        let by_extracted = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                journey_id: Some("1002".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(by_extracted.len(), 1);

        let by_source = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                journey_id: Some("3".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0]["extracted"]["confidence"], "low");
    }

    #[test]
    fn test_min_confidence_filter() {
        let records = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                min_confidence: Some("llm".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["source_id"], "4");
    }

    #[test]
    fn test_limit_applies_after_sort() {
        let records = filter_journeys(
            &sample_jsonl(),
            &JourneysQuery {
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["source_id"], "1");
    }
}
