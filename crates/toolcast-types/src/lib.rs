//! # toolcast-types
//!
//! Core type definitions for toolcast, the tool-event layer that lets a
//! voice tutoring session report client-side tool activity.
//!
//! This crate is the foundation of the dependency graph -- every other
//! toolcast crate depends on it. It contains:
//!
//! - **[`envelope`]** -- the [`ToolEventEnvelope`] wire message and its
//!   serialize / validating deserialize pair
//! - **[`result`]** -- [`ToolResult`] and the closed [`ErrorCode`] taxonomy
//! - **[`error`]** -- [`EnvelopeError`], [`ChannelError`], [`ConfigError`]
//! - **[`config`]** -- [`ToolcastConfig`] and config file discovery

pub mod config;
pub mod envelope;
pub mod error;
pub mod result;

pub use config::{FallbackConfig, Locale, ToolcastConfig};
pub use envelope::{
    EnvelopeMeta, EventPayload, PayloadValue, ToolEventEnvelope, ToolEventType,
    create_envelope, deserialize, serialize,
};
pub use error::{ChannelError, ConfigError, EnvelopeError};
pub use result::{ErrorCode, ToolResult};

/// Receiver-side hard ceiling for a single inbound message, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 65_536;
