//! # toolcast-plugin
//!
//! Tool plugin contract and execution for toolcast.
//!
//! - [`ToolPlugin`] / [`ToolRegistry`] -- tool definitions and lookup
//! - [`ToolOrchestrator`] -- validation, prerequisites, permissions,
//!   recursion guard, and time-boxed handler execution
//! - [`FeedbackHandler`] / [`VoiceFeedbackInjector`] -- spoken lines for
//!   proposals, confirmations, and errors
//! - [`TriggerDetector`] / [`VoiceToolFlow`] -- transcript to tool call,
//!   with lifecycle envelopes sent through a
//!   [`toolcast_channels::DualPathBroadcaster`]

pub mod context;
pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod plugin;
pub mod registry;
pub mod schema;
pub mod triggers;
pub mod voice_feedback;
pub mod voice_flow;

pub use context::{ActiveToolGuard, ActiveTools, ConversationTurn, ExecutionContext};
pub use error::PluginError;
pub use feedback::{FeedbackHandler, FeedbackInjector, error_sentence, not_recognized_sentence};
pub use orchestrator::{PreparedCall, ToolOrchestrator};
pub use plugin::{
    Permission, Prerequisite, PrerequisiteCheck, ToolCategory, ToolHandler, ToolMetadata,
    ToolPlugin, VoiceTemplate, handler_fn,
};
pub use registry::ToolRegistry;
pub use schema::{ArgSchema, ArgValidator, FieldKind, FieldSpec, ValidationIssue};
pub use triggers::{TriggerDetector, TriggerMatch, levenshtein_distance};
pub use voice_feedback::VoiceFeedbackInjector;
pub use voice_flow::{ArgumentExtractor, TranscriptExtractor, VoiceFlowOutcome, VoiceToolFlow};
