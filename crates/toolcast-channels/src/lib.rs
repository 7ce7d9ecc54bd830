//! # toolcast-channels
//!
//! Transport layer for tool events.
//!
//! - [`ChannelSender`] / [`ChannelReceiver`] -- the fast path over any
//!   [`DataChannel`], each driven by the channel's lifecycle notifications
//! - [`FallbackTransport`] / [`HttpFallback`] -- the store-and-forward path
//! - [`DualPathBroadcaster`] -- one `send_event` entry point over both
//! - [`ToolStateStore`] -- consumer-side per-tool state folded from
//!   received envelopes

pub mod broadcaster;
pub mod fallback;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod traits;

#[cfg(test)]
mod testing;

pub use broadcaster::{DeliveryMode, DualPathBroadcaster};
pub use fallback::{FallbackRequest, FallbackTransport, HttpFallback};
pub use receiver::{ChannelReceiver, EventCallback, ReceiverStats};
pub use sender::{ChannelSender, ChannelSignal, SenderState};
pub use state::{NewToolState, ToolState, ToolStateStats, ToolStateStore, ToolStateUpdate, ToolStatus};
pub use traits::{ChannelListener, DataChannel, ListenerId, ReadyState};
