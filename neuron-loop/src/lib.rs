#![deny(missing_docs)]
//! The agentic event loop for neuron: drives provider, tool, and context
//! interactions to completion, step by step, or streamed.
//!
//! [`AgentLoop`] owns the conversation history and drives the core cycle —
//! compact context if needed, call the provider, dispatch any tool calls,
//! append results, repeat — firing [`neuron_types::HookEvent`]s at each
//! stage and honoring [`neuron_types::RunPolicy`] tool-use quotas. A hook
//! can suspend a tool call by returning
//! [`neuron_types::HookAction::Interrupt`]; the loop records it in its
//! [`neuron_types::InterruptState`] and returns immediately so a caller can
//! resolve it (via [`AgentLoop::resume`]) and re-run.
//!
//! [`step`] offers finer control: [`step::StepIterator`] drives one turn at
//! a time, and [`AgentLoop::run_stream`] spawns the loop onto a background
//! task, forwarding [`neuron_types::StreamEvent`]s over a channel as the
//! provider streams its response and resolving its join handle to the same
//! [`AgentResult`] [`AgentLoop::run`] would have returned.

pub mod config;
pub mod loop_impl;
pub mod step;

pub use config::LoopConfig;
pub use loop_impl::{AgentLoop, AgentLoopBuilder, AgentResult, BoxedDurable, BoxedHook};
pub use step::{StepIterator, TurnResult};
