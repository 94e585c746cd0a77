//! Example: cancellation via CancellationToken.
//!
//! Demonstrates cooperative cancellation of the agent loop using a
//! CancellationToken with a timeout. No API key needed — uses a mock provider.
//!
//! Run with: `cargo run --example cancellation -p neuron-loop`

use neuron_context::SlidingWindowStrategy;
use neuron_loop::AgentLoop;
use neuron_tool::ToolRegistry;
use neuron_types::*;

// --- Mock provider that always requests a tool call (infinite loop without cancellation) ---

struct SlowProvider;

impl Provider for SlowProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        // Always return a tool call so the loop continues
        Ok(CompletionResponse {
            id: "resp-1".to_string(),
            model: "mock".to_string(),
            message: Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call-1".to_string(),
                    name: "wait".to_string(),
                    input: serde_json::json!({}),
                }],
            },
            usage: TokenUsage::default(),
            stop_reason: StopReason::ToolUse,
        })
    }

    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<StreamHandle, ProviderError> {
        Err(ProviderError::InvalidRequest("not supported".into()))
    }
}

// --- Simple tool that sleeps ---

struct WaitTool;

impl ToolDyn for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait briefly"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call_dyn<'a>(
        &'a self,
        _input: serde_json::Value,
        _ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(ToolOutput {
                content: vec![ContentItem::Text("waited".to_string())],
                structured_content: None,
                is_error: false,
            })
        })
    }
}

#[tokio::main]
async fn main() {
    let context = SlidingWindowStrategy::new(100, 100_000);

    let mut tools = ToolRegistry::new();
    tools.register(std::sync::Arc::new(WaitTool)).unwrap();

    let mut agent = AgentLoop::builder(SlowProvider, context)
        .tools(tools)
        .max_turns(100) // High limit — cancellation should stop it first
        .build();

    // Create a ToolContext with a cancellation token
    let ctx = ToolContext::default();
    let token = ctx.cancellation_token.clone();

    // Cancel after 300ms from a background task
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        println!("[canceller] Cancelling the loop...");
        token.cancel();
    });

    println!("[main] Starting agent loop (will be cancelled after ~300ms)...");

    match agent.run(Message::user("Do something"), &ctx).await {
        Err(LoopError::Cancelled) => {
            println!("[main] Loop was cancelled as expected!");
        }
        Ok(result) => {
            println!(
                "[main] Loop completed normally after {} turns",
                result.turns
            );
        }
        Err(e) => {
            println!("[main] Loop errored: {e}");
        }
    }
}
