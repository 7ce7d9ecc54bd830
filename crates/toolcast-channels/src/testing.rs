//! In-memory [`DataChannel`] used by the state-machine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use toolcast_types::ChannelError;

use crate::traits::{ChannelListener, DataChannel, ListenerId, ReadyState};

pub(crate) struct FakeChannel {
    label: String,
    ready: Mutex<ReadyState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChannelListener>)>>,
    next_listener: AtomicU64,
    sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
}

impl FakeChannel {
    pub(crate) fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            ready: Mutex::new(ReadyState::Connecting),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Snapshot, so callbacks run without the list locked.
    fn notify(&self, f: impl Fn(&dyn ChannelListener)) {
        let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for l in listeners {
            f(l.as_ref());
        }
    }

    /// Open the channel and notify the listeners.
    pub(crate) fn open(&self) {
        *self.ready.lock() = ReadyState::Open;
        self.notify(|l| l.on_open());
    }

    /// Close from the remote side and notify the listeners.
    pub(crate) fn remote_close(&self) {
        *self.ready.lock() = ReadyState::Closed;
        self.notify(|l| l.on_close());
    }

    pub(crate) fn fail(&self, reason: &str) {
        self.notify(|l| l.on_error(reason));
    }

    /// Change readiness without notifying anyone.
    pub(crate) fn set_ready_silently(&self, state: ReadyState) {
        *self.ready.lock() = state;
    }

    pub(crate) fn push_message(&self, data: &str) {
        self.notify(|l| l.on_message(data));
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn has_listener(&self) -> bool {
        self.listener_count() > 0
    }
}

impl DataChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock()
    }

    fn send(&self, data: &str) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("buffer full".into()));
        }
        self.sent.lock().push(data.to_string());
        Ok(())
    }

    fn close(&self) {
        self.remote_close();
    }

    fn add_listener(&self, listener: Arc<dyn ChannelListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}
