//! Listener registration
//!
//! Listeners are boxed callbacks stored under a [`ListenerHandle`] that the
//! caller gets back at registration time and uses for removal. Callbacks run
//! synchronously, in registration order.

use crate::message::Message;
use crate::signal::Signal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with the object that was updated
pub type Listener<T> = Box<dyn FnMut(&T) + Send>;

/// Ordered set of listeners for one signal or message
pub(crate) struct ListenerSet<T> {
    entries: BTreeMap<ListenerHandle, Listener<T>>,
}

impl<T> ListenerSet<T> {
    pub(crate) fn insert(&mut self, listener: Listener<T>) -> ListenerHandle {
        let handle = ListenerHandle::next();
        self.entries.insert(handle, listener);
        handle
    }

    /// Remove a listener; unknown handles are ignored
    pub(crate) fn remove(&mut self, handle: ListenerHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn notify(&mut self, target: &T) {
        for listener in self.entries.values_mut() {
            listener(target);
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// What a listener registered through a name path gets called with
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    Message(&'a Message),
    Signal(&'a Signal),
}

impl<'a> Notification<'a> {
    /// Name of the updated message or signal
    pub fn name(&self) -> &'a str {
        match *self {
            Notification::Message(message) => message.name(),
            Notification::Signal(signal) => signal.name(),
        }
    }
}

/// Target of a listener path: `"Message"` or `"Message.Signal"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPath<'a> {
    Message(&'a str),
    Signal { message: &'a str, signal: &'a str },
}

impl<'a> ListenerPath<'a> {
    /// Split a bare message name or a dotted `message.signal` name
    pub fn parse(path: &'a str) -> Self {
        match path.split_once('.') {
            Some((message, signal)) => ListenerPath::Signal { message, signal },
            None => ListenerPath::Message(path),
        }
    }
}
