//! The tool-calling agent loop.
//!
//! One question in, one answer out: the loop sends the conversation to the
//! chat provider with the registry's tool schemas, executes whatever tools
//! the model requests, feeds the results back, and stops at the first
//! final-text turn (or after `[chat].max_turns` round trips).

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::llm::{ChatMessage, ChatProvider, ChatTurn, OpenAiChat};
use crate::prompt::SYSTEM_PROMPT;
use crate::tools::{ToolContext, ToolRegistry};

/// CLI entry point for `jag ask`.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let provider = OpenAiChat::from_config(&config.chat)?;
    let registry = ToolRegistry::with_builtins();

    let start = Instant::now();
    let answer = run_agent(config, &provider, &registry, question).await?;

    println!("{}", answer);
    println!("---");
    println!("Responded in: {:.2} seconds", start.elapsed().as_secs_f64());
    Ok(())
}

/// Run the agent loop against an arbitrary provider and registry.
///
/// Returns the model's final answer text. Unknown tool names and tool
/// execution failures are reported back to the model as tool results, not
/// surfaced as errors; the model decides how to recover.
pub async fn run_agent(
    config: &Config,
    chat: &dyn ChatProvider,
    registry: &ToolRegistry,
    question: &str,
) -> Result<String> {
    let specs = registry.specs();
    let ctx = ToolContext::new(Arc::new(config.clone()));

    let mut messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(question),
    ];

    for turn in 0..config.chat.max_turns {
        match chat.chat(&messages, &specs).await? {
            ChatTurn::Text(text) => {
                tracing::debug!(turn, "agent finished");
                return Ok(text);
            }
            ChatTurn::ToolCalls { text, calls } => {
                messages.push(ChatMessage::assistant_tool_calls(text, calls.clone()));

                for call in calls {
                    let name = call.function.name.clone();
                    println!("step: {}", name);

                    let result = execute_call(registry, &ctx, &name, &call.function.arguments).await;
                    tracing::debug!(tool = %name, result_chars = result.len(), "tool executed");
                    messages.push(ChatMessage::tool_result(call.id, result));
                }
            }
        }
    }

    bail!(
        "agent did not produce a final answer within {} turns",
        config.chat.max_turns
    )
}

/// Execute one tool call, rendering every outcome as a string for the
/// model.
async fn execute_call(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    name: &str,
    arguments: &str,
) -> String {
    let Some(tool) = registry.find(name) else {
        return format!("ERROR: no tool registered with name: {}", name);
    };

    let params: serde_json::Value = serde_json::from_str(arguments)
        .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

    match tool.execute(params, ctx).await {
        Ok(value) => match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        Err(e) => format!("ERROR: {}", e),
    }
}
