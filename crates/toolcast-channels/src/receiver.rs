//! Inbound half of the fast path.
//!
//! [`ChannelReceiver`] listens on one [`DataChannel`], rejects oversized
//! messages before parsing them, drops anything that is not a valid
//! envelope, and hands valid envelopes to a swappable callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use toolcast_types::{MAX_MESSAGE_BYTES, ToolEventEnvelope, deserialize};
use tracing::{debug, info, warn};

use crate::traits::{ChannelListener, DataChannel, ListenerId};

/// Consumer of validated envelopes.
pub type EventCallback = Arc<dyn Fn(ToolEventEnvelope) + Send + Sync>;

/// Snapshot of receiver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Envelopes handed to the callback.
    pub delivered: u64,
    /// Messages above [`MAX_MESSAGE_BYTES`], dropped unparsed.
    pub oversized: u64,
    /// Messages that were not a valid envelope.
    pub invalid: u64,
    /// Valid envelopes dropped because no callback was set.
    pub no_callback: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    oversized: AtomicU64,
    invalid: AtomicU64,
    no_callback: AtomicU64,
}

struct Attachment {
    channel: Arc<dyn DataChannel>,
    generation: u64,
    /// Set once the channel has accepted the listener.
    listener: Option<ListenerId>,
}

struct ReceiverInner {
    attached: Mutex<Option<Attachment>>,
    callback: RwLock<Option<EventCallback>>,
    counters: Counters,
}

impl ReceiverInner {
    fn is_current(&self, generation: u64) -> bool {
        self.attached
            .lock()
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    fn handle_message(&self, data: &str) {
        if data.len() > MAX_MESSAGE_BYTES {
            self.counters.oversized.fetch_add(1, Ordering::Relaxed);
            warn!(
                bytes = data.len(),
                limit = MAX_MESSAGE_BYTES,
                "dropping oversized tool event"
            );
            return;
        }

        let Some(envelope) = deserialize(data) else {
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            warn!(bytes = data.len(), "dropping invalid tool event");
            return;
        };

        let callback = self.callback.read().clone();
        match callback {
            Some(callback) => {
                debug!(
                    tool_id = %envelope.tool_id,
                    event_type = %envelope.event_type,
                    "dispatching tool event"
                );
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                callback(envelope);
            }
            None => {
                self.counters.no_callback.fetch_add(1, Ordering::Relaxed);
                debug!(tool_id = %envelope.tool_id, "no event callback set, dropping");
            }
        }
    }
}

struct ReceiverListener {
    inner: Weak<ReceiverInner>,
    generation: u64,
}

impl ReceiverListener {
    fn current(&self) -> Option<Arc<ReceiverInner>> {
        self.inner
            .upgrade()
            .filter(|inner| inner.is_current(self.generation))
    }
}

impl ChannelListener for ReceiverListener {
    fn on_message(&self, data: &str) {
        if let Some(inner) = self.current() {
            inner.handle_message(data);
        }
    }

    fn on_close(&self) {
        if self.current().is_some() {
            info!("inbound tool-event channel closed");
        }
    }

    fn on_error(&self, reason: &str) {
        if self.current().is_some() {
            warn!(reason, "inbound tool-event channel error");
        }
    }
}

/// Validates and dispatches envelopes arriving on a low-latency channel.
pub struct ChannelReceiver {
    inner: Arc<ReceiverInner>,
    next_generation: AtomicU64,
}

impl Default for ChannelReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelReceiver {
    /// Create a detached receiver with no callback.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReceiverInner {
                attached: Mutex::new(None),
                callback: RwLock::new(None),
                counters: Counters::default(),
            }),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Create a receiver with a callback already set.
    pub fn with_callback(callback: EventCallback) -> Self {
        let receiver = Self::new();
        receiver.set_event_callback(Some(callback));
        receiver
    }

    /// Listen on `channel`, detaching from any previous channel first.
    ///
    /// Other listeners on the channel, such as a [`ChannelSender`] sharing
    /// it, keep receiving notifications.
    ///
    /// [`ChannelSender`]: crate::sender::ChannelSender
    pub fn attach_to_channel(&self, channel: Arc<dyn DataChannel>) {
        self.detach();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        *self.inner.attached.lock() = Some(Attachment {
            channel: channel.clone(),
            generation,
            listener: None,
        });

        let listener = channel.add_listener(Arc::new(ReceiverListener {
            inner: Arc::downgrade(&self.inner),
            generation,
        }));
        let recorded = match self.inner.attached.lock().as_mut() {
            Some(a) if a.generation == generation => {
                a.listener = Some(listener);
                true
            }
            _ => false,
        };
        if !recorded {
            // Detached or re-attached while the listener was going in.
            channel.remove_listener(listener);
            return;
        }
        debug!(label = channel.label(), "receiver attached");
    }

    /// Stop listening. Safe to call when nothing is attached.
    pub fn detach(&self) {
        let previous = self.inner.attached.lock().take();
        if let Some(previous) = previous {
            if let Some(listener) = previous.listener {
                previous.channel.remove_listener(listener);
            }
            debug!(label = previous.channel.label(), "receiver detached");
        }
    }

    /// Whether a channel is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.attached.lock().is_some()
    }

    /// Replace the consumer without touching the channel.
    pub fn set_event_callback(&self, callback: Option<EventCallback>) {
        *self.inner.callback.write() = callback;
    }

    /// Process one raw inbound message.
    pub fn handle_message(&self, data: &str) {
        self.inner.handle_message(data);
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ReceiverStats {
        let c = &self.inner.counters;
        ReceiverStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            oversized: c.oversized.load(Ordering::Relaxed),
            invalid: c.invalid.load(Ordering::Relaxed),
            no_callback: c.no_callback.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChannel;
    use toolcast_types::{ToolEventType, serialize};

    fn recording() -> (EventCallback, Arc<Mutex<Vec<ToolEventEnvelope>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: EventCallback = Arc::new(move |e| sink.lock().push(e));
        (callback, seen)
    }

    fn valid_message() -> String {
        serialize(&ToolEventEnvelope::new(ToolEventType::Completed, "quiz_1", 1000)).unwrap()
    }

    /// A valid envelope padded with whitespace to exactly `len` bytes.
    fn padded_message(len: usize) -> String {
        let mut msg = valid_message();
        let pad = len - msg.len();
        msg.insert_str(msg.len() - 1, &" ".repeat(pad));
        assert_eq!(msg.len(), len);
        msg
    }

    #[test]
    fn dispatches_valid_envelopes_from_channel() {
        let (callback, seen) = recording();
        let receiver = ChannelReceiver::with_callback(callback);
        let channel = FakeChannel::new("tools");
        receiver.attach_to_channel(channel.clone());

        channel.push_message(&valid_message());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].tool_id, "quiz_1");
        assert_eq!(receiver.stats().delivered, 1);
    }

    #[test]
    fn oversized_message_never_dispatched() {
        let (callback, seen) = recording();
        let receiver = ChannelReceiver::with_callback(callback);
        receiver.handle_message(&"x".repeat(70_000));
        assert!(seen.lock().is_empty());
        assert_eq!(receiver.stats().oversized, 1);
        assert_eq!(receiver.stats().invalid, 0);
    }

    #[test]
    fn size_limit_boundary() {
        let (callback, seen) = recording();
        let receiver = ChannelReceiver::with_callback(callback);

        receiver.handle_message(&padded_message(MAX_MESSAGE_BYTES));
        assert_eq!(seen.lock().len(), 1);

        receiver.handle_message(&padded_message(MAX_MESSAGE_BYTES + 1));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(receiver.stats().oversized, 1);
    }

    #[test]
    fn invalid_messages_are_dropped() {
        let (callback, seen) = recording();
        let receiver = ChannelReceiver::with_callback(callback);
        receiver.handle_message("not json");
        receiver.handle_message(r#"{"type":"NOPE","toolId":"a","timestamp":1}"#);
        assert!(seen.lock().is_empty());
        assert_eq!(receiver.stats().invalid, 2);
    }

    #[test]
    fn missing_callback_is_counted() {
        let receiver = ChannelReceiver::new();
        receiver.handle_message(&valid_message());
        assert_eq!(receiver.stats().no_callback, 1);
    }

    #[test]
    fn callback_hot_swap() {
        let (first, first_seen) = recording();
        let (second, second_seen) = recording();
        let receiver = ChannelReceiver::with_callback(first);
        let channel = FakeChannel::new("tools");
        receiver.attach_to_channel(channel.clone());

        channel.push_message(&valid_message());
        receiver.set_event_callback(Some(second));
        channel.push_message(&valid_message());

        assert_eq!(first_seen.lock().len(), 1);
        assert_eq!(second_seen.lock().len(), 1);
        assert!(channel.has_listener());
    }

    #[test]
    fn reattach_detaches_previous_channel() {
        let (callback, seen) = recording();
        let receiver = ChannelReceiver::with_callback(callback);
        let old = FakeChannel::new("old");
        let new = FakeChannel::new("new");
        receiver.attach_to_channel(old.clone());
        receiver.attach_to_channel(new.clone());

        assert!(!old.has_listener());
        old.push_message(&valid_message());
        new.push_message(&valid_message());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn detach_is_idempotent() {
        let receiver = ChannelReceiver::new();
        receiver.detach();
        let channel = FakeChannel::new("tools");
        receiver.attach_to_channel(channel.clone());
        assert!(receiver.is_attached());
        receiver.detach();
        receiver.detach();
        assert!(!receiver.is_attached());
        assert!(!channel.has_listener());
    }

    #[test]
    fn drop_detaches() {
        let channel = FakeChannel::new("tools");
        {
            let receiver = ChannelReceiver::new();
            receiver.attach_to_channel(channel.clone());
        }
        assert!(!channel.has_listener());
    }
}
