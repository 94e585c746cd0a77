#![deny(missing_docs)]
//! Context management for neuron: token-budget compaction strategies and
//! the tool-pairing-aware conversation manager.
//!
//! [`ContextStrategy`](neuron_types::ContextStrategy) implementations
//! (`strategies` module) are driven by a token estimate the caller supplies
//! and know nothing about tool-call structure; the [`ConversationManager`]
//! (`conversation_manager` module) is driven by the loop itself once per
//! cycle and never splits a `toolUse` from its matching `toolResult`. Most
//! agents use a `ConversationManager` for routine trimming and a
//! `ContextStrategy` (often [`SummarizationStrategy`]) for deeper compaction
//! when trimming alone isn't enough.

pub mod conversation_manager;
pub mod counter;
pub mod injector;
pub mod persistent;
pub mod strategies;

pub use conversation_manager::{
    ConversationManager, NullConversationManager, SlidingWindowConversationManager,
};
pub use counter::TokenCounter;
pub use injector::{InjectionTrigger, SystemInjector};
pub use persistent::{ContextSection, PersistentContext};
pub use strategies::{
    BoxedStrategy, CompositeStrategy, SlidingWindowStrategy, SummarizationStrategy,
    ToolResultClearingStrategy,
};
