//! Change broadcast hub
//!
//! One hub exists per backing store and is shared by every [`LocalStore`]
//! handle attached to it. After a committed mutation the originating handle
//! publishes a [`HubEvent`]; the hub pushes a copy into the inbox of every
//! subscribed handle, the originator included.
//!
//! Inboxes are unbounded channels. Publishing never blocks and never runs
//! code of the receiving handle: each handle drains its own inbox on its own
//! thread (see [`LocalStore::process_events`]). An inbox keeps every change,
//! saved documents included, until its handle drains it, so an idle handle
//! grows its inbox with each foreign write.
//!
//! [`LocalStore`]: crate::LocalStore
//! [`LocalStore::process_events`]: crate::LocalStore::process_events

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::key::{Document, ObjectKey};

/// Process-unique identity of a store handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// What a committed mutation changed
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A document was saved (`document` is set) or removed (`document` is `None`)
    Document {
        key: ObjectKey,
        document: Option<Document>,
        /// Blob size of the new content, 0 for removals
        size: u64,
    },
    /// All documents of one type were dropped
    TypeCleared { type_name: Vec<u8> },
    /// The whole store was wiped
    Reset,
}

/// A change together with the handle that committed it
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    pub origin: HandleId,
    pub change: Change,
}

/// Events raised by a store handle to its local subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A document was saved or deleted
    Changed { key: ObjectKey, deleted: bool },
    /// A whole type was cleared
    TypeCleared { type_name: Vec<u8> },
    /// The store was reset
    Reset,
}

impl From<&Change> for StoreEvent {
    fn from(change: &Change) -> Self {
        match change {
            Change::Document { key, document, .. } => StoreEvent::Changed {
                key: key.clone(),
                deleted: document.is_none(),
            },
            Change::TypeCleared { type_name } => StoreEvent::TypeCleared {
                type_name: type_name.clone(),
            },
            Change::Reset => StoreEvent::Reset,
        }
    }
}

/// Fan-out point for commit notifications
#[derive(Debug, Default)]
pub struct ChangeHub {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(HandleId, mpsc::UnboundedSender<HubEvent>)>>,
}

impl ChangeHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new handle and return its identity and inbox
    pub fn subscribe(&self) -> (HandleId, mpsc::UnboundedReceiver<HubEvent>) {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((id, tx));
        debug!(handle = %id, "Handle subscribed to change hub");
        (id, rx)
    }

    /// Remove a handle's inbox
    pub fn unsubscribe(&self, id: HandleId) {
        self.subscribers.lock().retain(|(sub, _)| *sub != id);
        debug!(handle = %id, "Handle unsubscribed from change hub");
    }

    /// Deliver a change to every subscribed handle
    ///
    /// Each inbox gets its own copy of the change. Inboxes whose handle is
    /// gone are pruned.
    pub fn publish(&self, origin: HandleId, change: Change) {
        let event = HubEvent { origin, change };
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        debug!(origin = %origin, receivers = subscribers.len(), "Published change");
    }

    /// Number of subscribed handles
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
