//! Low-latency channel abstraction.
//!
//! - [`DataChannel`] -- implemented by the host's duplex message channel
//!   (a WebRTC data channel, a WebSocket, an in-process pipe)
//! - [`ChannelListener`] -- implemented by the sender and receiver, installed
//!   on a channel to observe its lifecycle and inbound messages; several
//!   may share one channel, each removed by its own [`ListenerId`]

use std::fmt;
use std::sync::Arc;

use toolcast_types::ChannelError;

/// Readiness reported by the channel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Not yet open.
    Connecting,
    /// Messages can flow.
    Open,
    /// Shutting down.
    Closing,
    /// Closed; no further messages.
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Callbacks a channel invokes as its state changes.
///
/// All methods default to no-ops so listeners only implement what they need.
pub trait ChannelListener: Send + Sync {
    /// The channel became open.
    fn on_open(&self) {}

    /// The channel closed.
    fn on_close(&self) {}

    /// The channel reported an error.
    fn on_error(&self, _reason: &str) {}

    /// A text message arrived.
    fn on_message(&self, _data: &str) {}
}

/// Handle returned by [`DataChannel::add_listener`], used to remove that
/// listener again without touching any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A duplex, message-oriented channel.
///
/// A channel notifies every installed listener, so an outbound sender and an
/// inbound receiver can share one channel. After `remove_listener` returns,
/// the channel must not invoke that listener again.
pub trait DataChannel: Send + Sync {
    /// Channel label, for logs.
    fn label(&self) -> &str;

    /// Low-level readiness, read directly from the channel.
    fn ready_state(&self) -> ReadyState;

    /// Transmit one text message.
    fn send(&self, data: &str) -> Result<(), ChannelError>;

    /// Close the channel.
    fn close(&self);

    /// Install a listener alongside any already present.
    fn add_listener(&self, listener: Arc<dyn ChannelListener>) -> ListenerId;

    /// Remove one listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}
