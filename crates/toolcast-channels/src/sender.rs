//! Outbound half of the fast path.
//!
//! [`ChannelSender`] wraps one [`DataChannel`] and tracks its lifecycle as an
//! explicit state machine driven by channel notifications:
//!
//! ```text
//! idle --open--> open --close--> closed
//!                  \--error--> error --close--> closed
//! ```
//!
//! Every attachment gets a fresh generation number. Listeners installed on a
//! replaced channel carry the old generation and are ignored even if that
//! channel keeps firing callbacks after it was swapped out.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use toolcast_types::{ToolEventEnvelope, serialize};
use tracing::{debug, warn};

use crate::traits::{ChannelListener, DataChannel, ListenerId, ReadyState};

/// Sender lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// No open notification seen on the current channel.
    Idle,
    /// Channel reported open.
    Open,
    /// Channel reported close.
    Closed,
    /// Channel reported an error.
    Error,
}

/// Notification that drives a [`SenderState`] transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignal {
    /// The channel fired its open notification.
    Opened,
    /// The channel fired its close notification.
    Closed,
    /// The channel reported an error.
    Errored,
}

impl SenderState {
    /// Apply one channel notification.
    pub fn on_signal(self, signal: ChannelSignal) -> SenderState {
        match signal {
            ChannelSignal::Opened => SenderState::Open,
            ChannelSignal::Closed => SenderState::Closed,
            ChannelSignal::Errored => SenderState::Error,
        }
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
        }
    }
}

struct Attached {
    channel: Arc<dyn DataChannel>,
    listener: ListenerId,
}

struct Slot {
    attached: Option<Attached>,
    state: SenderState,
    generation: u64,
}

struct SenderInner {
    slot: Mutex<Slot>,
}

impl SenderInner {
    fn apply(&self, generation: u64, signal: ChannelSignal) {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            debug!(?signal, "ignoring notification from a detached channel");
            return;
        }
        let next = slot.state.on_signal(signal);
        debug!(from = %slot.state, to = %next, "sender state transition");
        slot.state = next;
    }
}

struct SenderListener {
    inner: Weak<SenderInner>,
    generation: u64,
}

impl SenderListener {
    fn forward(&self, signal: ChannelSignal) {
        if let Some(inner) = self.inner.upgrade() {
            inner.apply(self.generation, signal);
        }
    }
}

impl ChannelListener for SenderListener {
    fn on_open(&self) {
        self.forward(ChannelSignal::Opened);
    }

    fn on_close(&self) {
        self.forward(ChannelSignal::Closed);
    }

    fn on_error(&self, reason: &str) {
        warn!(reason, "outbound tool-event channel error");
        self.forward(ChannelSignal::Errored);
    }
}

/// Serializes envelopes onto an attached low-latency channel.
pub struct ChannelSender {
    inner: Arc<SenderInner>,
}

impl Default for ChannelSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSender {
    /// Create a sender with no channel attached.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SenderInner {
                slot: Mutex::new(Slot {
                    attached: None,
                    state: SenderState::Idle,
                    generation: 0,
                }),
            }),
        }
    }

    /// Replace the attached channel, or detach with `None`.
    ///
    /// Only the sender's own listener is removed from the previous channel;
    /// other listeners sharing it are left alone. A channel that is already
    /// open when attached is treated as if it had just fired its open
    /// notification.
    pub fn set_channel(&self, channel: Option<Arc<dyn DataChannel>>) {
        let (previous, generation) = {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.state = SenderState::Idle;
            (slot.attached.take(), slot.generation)
        };

        if let Some(previous) = previous {
            debug!(label = previous.channel.label(), "detaching outbound channel");
            previous.channel.remove_listener(previous.listener);
        }

        let Some(channel) = channel else {
            return;
        };
        debug!(label = channel.label(), "attaching outbound channel");
        let listener = channel.add_listener(Arc::new(SenderListener {
            inner: Arc::downgrade(&self.inner),
            generation,
        }));

        let superseded = {
            let mut slot = self.inner.slot.lock();
            if slot.generation == generation {
                slot.attached = Some(Attached {
                    channel: channel.clone(),
                    listener,
                });
                false
            } else {
                true
            }
        };
        // A concurrent set_channel won; this attachment is already stale.
        if superseded {
            channel.remove_listener(listener);
            return;
        }

        if channel.ready_state() == ReadyState::Open {
            self.inner.apply(generation, ChannelSignal::Opened);
        }
    }

    /// Current tracked state.
    pub fn state(&self) -> SenderState {
        self.inner.slot.lock().state
    }

    /// True only when a channel is attached, its tracked state is open, and
    /// the channel's own readiness still reports open.
    pub fn is_connected(&self) -> bool {
        let channel = {
            let slot = self.inner.slot.lock();
            if slot.state != SenderState::Open {
                return false;
            }
            slot.attached.as_ref().map(|a| a.channel.clone())
        };
        channel.is_some_and(|c| c.ready_state() == ReadyState::Open)
    }

    /// Transmit one envelope. Returns `false` without sending when not
    /// connected, and `false` when encoding or transmission fails.
    pub fn send_event(&self, envelope: &ToolEventEnvelope) -> bool {
        if !self.is_connected() {
            debug!(tool_id = %envelope.tool_id, "sender not connected, skipping fast path");
            return false;
        }
        let Some(channel) = self.inner.slot.lock().attached.as_ref().map(|a| a.channel.clone()) else {
            return false;
        };

        let json = match serialize(envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(tool_id = %envelope.tool_id, error = %e, "failed to encode tool event");
                return false;
            }
        };

        match channel.send(&json) {
            Ok(()) => {
                debug!(
                    tool_id = %envelope.tool_id,
                    event_type = %envelope.event_type,
                    bytes = json.len(),
                    "tool event sent over data channel"
                );
                true
            }
            Err(e) => {
                warn!(tool_id = %envelope.tool_id, error = %e, "data channel send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChannel;
    use toolcast_types::ToolEventType;

    fn envelope() -> ToolEventEnvelope {
        ToolEventEnvelope::new(ToolEventType::Executing, "quiz_1", 1000)
    }

    #[test]
    fn transitions() {
        use ChannelSignal::*;
        assert_eq!(SenderState::Idle.on_signal(Opened), SenderState::Open);
        assert_eq!(SenderState::Open.on_signal(Closed), SenderState::Closed);
        assert_eq!(SenderState::Open.on_signal(Errored), SenderState::Error);
        assert_eq!(SenderState::Error.on_signal(Closed), SenderState::Closed);
        assert_eq!(SenderState::Closed.on_signal(Opened), SenderState::Open);
    }

    #[test]
    fn connected_only_between_open_and_close() {
        let sender = ChannelSender::new();
        assert!(!sender.is_connected());

        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        assert_eq!(sender.state(), SenderState::Idle);
        assert!(!sender.is_connected());

        channel.open();
        assert!(sender.is_connected());

        channel.remote_close();
        assert_eq!(sender.state(), SenderState::Closed);
        assert!(!sender.is_connected());
    }

    #[test]
    fn error_disconnects() {
        let sender = ChannelSender::new();
        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        channel.open();
        channel.fail("ice failure");
        assert_eq!(sender.state(), SenderState::Error);
        assert!(!sender.is_connected());
    }

    #[test]
    fn ready_state_is_double_checked() {
        let sender = ChannelSender::new();
        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        channel.open();
        channel.set_ready_silently(ReadyState::Closing);
        assert_eq!(sender.state(), SenderState::Open);
        assert!(!sender.is_connected());
        assert!(!sender.send_event(&envelope()));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn sends_serialized_envelope_when_open() {
        let sender = ChannelSender::new();
        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        channel.open();

        assert!(sender.send_event(&envelope()));
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(toolcast_types::deserialize(&sent[0]), Some(envelope()));
    }

    #[test]
    fn not_open_returns_false_without_sending() {
        let sender = ChannelSender::new();
        assert!(!sender.send_event(&envelope()));

        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        assert!(!sender.send_event(&envelope()));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn transmission_failure_returns_false() {
        let sender = ChannelSender::new();
        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        channel.open();
        channel.fail_sends(true);
        assert!(!sender.send_event(&envelope()));
        assert!(sender.is_connected());
    }

    #[test]
    fn replaced_channel_cannot_drive_state() {
        let sender = ChannelSender::new();
        let old = FakeChannel::new("old");
        sender.set_channel(Some(old.clone()));
        old.open();

        let new = FakeChannel::new("new");
        sender.set_channel(Some(new.clone()));
        assert!(!old.has_listener());
        assert!(new.has_listener());
        assert_eq!(sender.state(), SenderState::Idle);

        new.open();
        // A stale close from the old channel is ignored.
        old.remote_close();
        assert!(sender.is_connected());
    }

    #[test]
    fn stale_listener_is_ignored_even_if_channel_keeps_it() {
        let sender = ChannelSender::new();
        let old = FakeChannel::new("old");
        sender.set_channel(Some(old.clone()));
        let stale: Arc<dyn ChannelListener> = Arc::new(SenderListener {
            inner: Arc::downgrade(&sender.inner),
            generation: 1,
        });

        let new = FakeChannel::new("new");
        sender.set_channel(Some(new.clone()));
        new.open();
        stale.on_error("late error");
        assert_eq!(sender.state(), SenderState::Open);
    }

    #[test]
    fn attaching_an_open_channel_syncs_state() {
        let channel = FakeChannel::new("tools");
        channel.set_ready_silently(ReadyState::Open);
        let sender = ChannelSender::new();
        sender.set_channel(Some(channel.clone()));
        assert!(sender.is_connected());
    }

    #[test]
    fn shares_a_channel_with_a_receiver() {
        use crate::receiver::{ChannelReceiver, EventCallback};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: EventCallback = Arc::new(move |e| sink.lock().push(e));
        let receiver = ChannelReceiver::with_callback(callback);

        let sender = ChannelSender::new();
        let channel = FakeChannel::new("duplex");
        sender.set_channel(Some(channel.clone()));
        receiver.attach_to_channel(channel.clone());
        assert_eq!(channel.listener_count(), 2);

        channel.open();
        assert!(sender.is_connected());
        assert!(sender.send_event(&envelope()));

        channel.push_message(&serialize(&envelope()).unwrap());
        assert_eq!(seen.lock().len(), 1);

        // Each side removes only its own listener.
        receiver.detach();
        assert_eq!(channel.listener_count(), 1);
        assert!(sender.is_connected());
        channel.fail("ice failure");
        assert_eq!(sender.state(), SenderState::Error);

        receiver.attach_to_channel(channel.clone());
        sender.set_channel(None);
        assert_eq!(channel.listener_count(), 1);
        channel.push_message(&serialize(&envelope()).unwrap());
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn detach_with_none() {
        let sender = ChannelSender::new();
        let channel = FakeChannel::new("tools");
        sender.set_channel(Some(channel.clone()));
        channel.open();

        sender.set_channel(None);
        assert!(!channel.has_listener());
        assert!(!sender.is_connected());
        assert_eq!(sender.state(), SenderState::Idle);
    }
}
