//! Tool trait, registry, and the built-in tools.
//!
//! Tools are what the chat model can call: each advertises an OpenAI
//! function-calling parameter schema and executes against a [`ToolContext`]
//! holding the shared configuration. The same registry backs both the
//! agent loop (`jag ask`) and the HTTP server's `POST /tools/{name}`
//! dispatch.
//!
//! The journey extractor itself is a free function in
//! `journey-agent-core` with no knowledge of this layer;
//! [`ExtractJourneyTool`] is the adapter that makes it callable by agents.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use journey_agent_core::criteria::StrategyCriteria;
use journey_agent_core::extract::extract_journey_info;

use crate::config::Config;
use crate::llm::ToolSpec;
use crate::retrieve;

/// Maximum characters of a non-JSON backend reply passed through to the
/// model.
const BACKEND_REPLY_LIMIT: usize = 10_000;

/// A callable tool exposed to agents.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores; doubles as the route path
    /// (`POST /tools/{name}`).
    fn name(&self) -> &str;

    /// One-line description used for agent tool selection.
    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with validated parameters (always a JSON object).
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Shared state handed to every tool execution.
pub struct ToolContext {
    pub config: Arc<Config>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

/// Registry of all tools available to the agent and the HTTP server.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry pre-loaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RetrieveContextTool));
        registry.register(Box::new(SearchStrategiesTool));
        registry.register(Box::new(ExtractJourneyTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Function-calling specs for a chat request.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate tool parameters against a function-calling schema.
///
/// Checks required fields and primitive types; unknown parameters pass
/// through untouched (the model sometimes adds extras, and tools project
/// what they need).
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let empty = serde_json::Map::new();
    let params_obj = params.as_object().unwrap_or(&empty);

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in properties {
            let Some(value) = params_obj.get(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
                let ok = match expected {
                    "string" => value.is_string(),
                    "integer" => value.is_i64() || value.is_u64(),
                    "number" => value.is_number(),
                    "boolean" => value.is_boolean(),
                    "array" => value.is_array(),
                    "object" => value.is_object(),
                    _ => true,
                };
                if !ok {
                    bail!("parameter '{}' must be of type '{}'", name, expected);
                }
            }
        }
    }

    Ok(Value::Object(params_obj.clone()))
}

// ============ retrieve_context ============

/// Vector retrieval over the ingested documentation.
pub struct RetrieveContextTool;

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        "retrieve_context"
    }

    fn description(&self) -> &str {
        "Retrieve relevant context from the revenue management documentation"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query to find relevant documentation" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }

        let retrieved = retrieve::retrieve_context(&ctx.config, query).await?;
        let sources: Vec<Value> = retrieved
            .passages
            .iter()
            .map(|p| {
                serde_json::json!({
                    "document_id": p.document_id,
                    "source": p.source,
                    "title": p.title,
                    "chunk_index": p.chunk_index,
                    "score": p.score,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "context": retrieved.context,
            "sources": sources,
        }))
    }
}

// ============ search_strategies ============

/// Live strategy search against the remote backend.
///
/// Backend and transport failures are returned *inside* the tool result
/// (`{"error": ...}`) rather than as execution errors, so the model can
/// read them and recover.
pub struct SearchStrategiesTool;

#[async_trait]
impl Tool for SearchStrategiesTool {
    fn name(&self) -> &str {
        "search_strategies"
    }

    fn description(&self) -> &str {
        "Search the strategy backend by criteria (codes, name, types, validity, journey groups)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "page": { "type": "integer", "description": "Page number", "default": 0 },
                "size": { "type": "integer", "description": "Page size", "default": 25 },
                "codes": { "type": "array", "items": { "type": "string" }, "description": "Exact strategy codes" },
                "codeMatch": { "type": "string", "description": "Code prefix/wildcard match" },
                "name": { "type": "string" },
                "description": { "type": "string" },
                "valid": { "type": "boolean" },
                "types": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": [
                            "ADVANCE_PURCHASE", "AU_SETTING", "CLASS_NON_REOPENING",
                            "COMPETITION_MATCHING", "FINAL_AU_SETTING", "INITIAL_GROUPING",
                            "JOURNEY_SCORING", "LINKED_CLOSURE", "LINKED_DEPARTURE",
                            "LINKED_DEPARTURE_CLOSURE", "LINKED_RELATION", "OD_LINKED_RELATION",
                            "PRICE_CONSISTENCY", "SPILL_CONTROL", "SPOILAGE_ALLOCATION"
                        ]
                    }
                },
                "journeyGroups": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Some(base_url) = ctx.config.backend.base_url.as_deref() else {
            return Ok(serde_json::json!({ "error": "backend.base_url is not configured" }));
        };

        let criteria: StrategyCriteria = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => return Ok(serde_json::json!({ "error": format!("invalid criteria: {}", e) })),
        };

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if ctx.config.backend.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        let url = format!("{}/api/strategies/search", base_url.trim_end_matches('/'));
        let mut request = client
            .post(&url)
            .header("Accept", "application/json")
            .json(&criteria);
        if let Ok(token) = std::env::var(&ctx.config.backend.token_env) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "strategy backend unreachable");
                return Ok(serde_json::json!({ "error": format!("request failed: {}", e) }));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let truncated: String = body.chars().take(BACKEND_REPLY_LIMIT).collect();
            return Ok(
                serde_json::json!({ "error": format!("backend error {}: {}", status, truncated) }),
            );
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(json) => Ok(json),
            Err(_) => Ok(Value::String(body.chars().take(BACKEND_REPLY_LIMIT).collect())),
        }
    }
}

// ============ extract_journey_info ============

/// Deterministic journey-record extraction over free text.
pub struct ExtractJourneyTool;

#[async_trait]
impl Tool for ExtractJourneyTool {
    fn name(&self) -> &str {
        "extract_journey_info"
    }

    fn description(&self) -> &str {
        "Extract journey_id, score, reason and solution from text and return JSON"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text or document to analyze" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let text = params["text"].as_str().unwrap_or("");
        let record = extract_journey_info(text, None);
        Ok(serde_json::to_value(record)?)
    }
}
