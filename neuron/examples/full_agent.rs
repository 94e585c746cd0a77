//! End-to-end agent using a scripted provider, a tool registry, and the
//! agent loop.
//!
//! No API key needed — [`ScriptedProvider`] replays a pre-programmed script
//! so the example runs offline. Swap it for a real provider adapter to talk
//! to an actual model.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example full_agent -p neuron
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use neuron::context::SlidingWindowStrategy;
use neuron::prelude::*;
use neuron_provider_mock::{ScriptedProvider, ScriptedResponse};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// A simple calculator tool for the agent to use
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct CalculateArgs {
    /// A mathematical expression like "2 + 2"
    expression: String,
}

struct CalculateTool;

impl ToolDyn for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a simple math expression. Supports +, -, *, /."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(CalculateArgs)).expect("schema serialization")
    }

    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        _ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let args: CalculateArgs = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
            let expr = args.expression.trim();
            let result = eval_simple(expr)
                .ok_or_else(|| ToolError::ExecutionFailed(format!("cannot evaluate: {expr}")))?;
            Ok(ToolOutput {
                content: vec![ContentItem::Text(format!("{result}"))],
                structured_content: Some(serde_json::json!({"result": result})),
                is_error: false,
            })
        })
    }
}

fn eval_simple(expr: &str) -> Option<f64> {
    for op in [" + ", " - ", " * ", " / "] {
        if let Some((left, right)) = expr.split_once(op) {
            let a: f64 = left.trim().parse().ok()?;
            let b: f64 = right.trim().parse().ok()?;
            return Some(match op.trim() {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                _ => return None,
            });
        }
    }
    expr.parse().ok()
}

fn tool_call_response(tool_name: &str, input: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        id: "scripted-1".to_string(),
        model: "scripted".to_string(),
        message: Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "call-1".to_string(),
                name: tool_name.to_string(),
                input,
            }],
        },
        usage: TokenUsage::default(),
        stop_reason: StopReason::ToolUse,
    }
}

fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        id: "scripted-2".to_string(),
        model: "scripted".to_string(),
        message: Message::assistant(text),
        usage: TokenUsage::default(),
        stop_reason: StopReason::EndTurn,
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. A scripted provider that calls `calculate` once, then answers.
    let provider = ScriptedProvider::new([
        ScriptedResponse::from(tool_call_response(
            "calculate",
            serde_json::json!({"expression": "42 * 17"}),
        )),
        ScriptedResponse::from(text_response("42 * 17 is 714.")),
    ]);

    // 2. Create a ToolRegistry and register a tool.
    let mut tools = ToolRegistry::new();
    tools.register(std::sync::Arc::new(CalculateTool)).unwrap();

    // 3. Create a SlidingWindowStrategy for context management.
    //    Keep at most 20 messages, targeting a 100k token window.
    let context = SlidingWindowStrategy::new(20, 100_000);

    // 4. Build an AgentLoop with the builder.
    let mut agent = AgentLoop::builder(provider, context)
        .tools(tools)
        .system_prompt(
            "You are a helpful math assistant. Use the calculate tool for arithmetic. \
             After getting the result, respond with a short sentence stating the answer.",
        )
        .max_turns(5)
        .build();

    // 5. Run the agent with a user prompt.
    let tool_ctx = ToolContext {
        cwd: PathBuf::from("/tmp"),
        session_id: "example-session".into(),
        environment: HashMap::new(),
        cancellation_token: CancellationToken::new(),
        progress_reporter: None,
    };

    let result = agent
        .run_text("What is 42 * 17? Use the calculate tool.", &tool_ctx)
        .await?;

    // 6. Print the response.
    println!("Agent response: {}", result.response);
    println!("Turns taken:    {}", result.turns);
    println!(
        "Token usage:    {} input / {} output",
        result.usage.input_tokens, result.usage.output_tokens
    );

    Ok(())
}
