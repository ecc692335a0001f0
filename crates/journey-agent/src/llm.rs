//! Chat-completion client with function calling.
//!
//! [`ChatProvider`] is the seam between the agent loop and the hosted
//! model: one async call per model turn, returning either final text or a
//! set of tool calls. [`OpenAiChat`] implements it against any
//! OpenAI-compatible `/chat/completions` endpoint; tests script their own
//! provider.
//!
//! Messages are kept wire-shaped (OpenAI roles plus `tool_calls` /
//! `tool_call_id`), so the agent loop appends tool results directly
//! without a separate conversion layer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use journey_agent_core::extract;
use journey_agent_core::record::JourneyRecord;

use crate::config::ChatConfig;

/// A single conversation message in OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    /// Assistant message carrying the model's tool calls, echoed back so
    /// the next request has the full exchange.
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: text.unwrap_or_default(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// The result of one tool execution, addressed to its originating call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// A tool advertised to the model (OpenAI function-calling schema).
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Outcome of one model turn.
#[derive(Debug, Clone)]
pub enum ChatTurn {
    /// The model produced a final answer.
    Text(String),
    /// The model wants tools executed before it continues.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// One async call per model turn.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatTurn>;
    fn name(&self) -> &str;
}

/// Chat client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiChat {
    /// Build a client from configuration. Fails when the configured API
    /// key environment variable is not set.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let mut base_url = config.base_url.clone();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn send_request(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatTurn> {
        let wire_tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        if !wire_tools.is_empty() {
            body["tools"] = serde_json::Value::Array(wire_tools);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            bail!("rate limited");
        }
        if !status.is_success() {
            tracing::error!(%status, body = %text, "chat API error");
            bail!("chat API request failed (status {})", status);
        }

        let resp: ChatResponse = serde_json::from_str(&text)?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("chat API returned no choices"))?;

        if let Some(calls) = choice.message.tool_calls {
            if !calls.is_empty() {
                let text = if choice.message.content.is_empty() {
                    None
                } else {
                    Some(choice.message.content)
                };
                return Ok(ChatTurn::ToolCalls { text, calls });
            }
        }

        Ok(ChatTurn::Text(choice.message.content))
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatTurn> {
        match self.send_request(messages, tools).await {
            Err(e) if e.to_string() == "rate limited" => {
                tracing::warn!("chat API rate limited, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.send_request(messages, tools).await
            }
            other => other,
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Drive one LLM refinement attempt for a low-confidence record.
///
/// Async counterpart of the core's synchronous refinement: sends the fixed
/// refinement prompt as a plain (tool-free) chat turn and parses the reply.
/// Every failure mode returns `None`; the caller keeps its low-confidence
/// record.
pub async fn refine_record(chat: &dyn ChatProvider, text: &str) -> Option<JourneyRecord> {
    let messages = [ChatMessage::user(extract::refinement_prompt(text))];
    match chat.chat(&messages, &[]).await {
        Ok(ChatTurn::Text(reply)) => extract::parse_refinement(&reply).map(JourneyRecord::normalize),
        Ok(ChatTurn::ToolCalls { .. }) | Err(_) => None,
    }
}
