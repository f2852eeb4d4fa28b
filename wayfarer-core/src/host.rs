//! Host integration seams
//!
//! The engine reads the chat log and world-knowledge entries through these
//! traits and receives host notifications through [`EventHub`]. It never
//! writes to the log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::debug;

use crate::types::PositionIndex;

/// One chat message as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

/// Read-only view of the host's message log.
pub trait MessageLog: Send + Sync {
    fn len(&self) -> usize;

    fn message_at(&self, index: usize) -> Option<Message>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a position index, rejecting the lore sentinel and negatives.
    fn message_at_position(&self, position: PositionIndex) -> Option<Message> {
        usize::try_from(position)
            .ok()
            .and_then(|index| self.message_at(index))
    }
}

/// In-process message log used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    messages: RwLock<Vec<String>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: RwLock::new(messages.into_iter().map(Into::into).collect()),
        }
    }

    /// Append and return the new message's index.
    pub fn push(&self, text: impl Into<String>) -> usize {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        messages.push(text.into());
        messages.len() - 1
    }

    pub fn truncate(&self, len: usize) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(len);
    }

    pub fn clear(&self) {
        self.truncate(0);
    }
}

impl MessageLog for InMemoryLog {
    fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn message_at(&self, index: usize) -> Option<Message> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|text| Message { text: text.clone() })
    }
}

// =============================================================================
// WORLD KNOWLEDGE
// =============================================================================

/// A world-knowledge entry: trigger keywords plus body text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoreEntry {
    #[serde(default, alias = "key", alias = "keys")]
    pub tags: Vec<String>,
    #[serde(default, alias = "content")]
    pub text: String,
}

pub trait LoreSource: Send + Sync {
    fn list_entries(&self) -> Vec<LoreEntry>;
}

/// Fixed set of lore entries.
#[derive(Debug, Clone, Default)]
pub struct StaticLore {
    entries: Vec<LoreEntry>,
}

impl StaticLore {
    pub fn new(entries: Vec<LoreEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl LoreSource for StaticLore {
    fn list_entries(&self) -> Vec<LoreEntry> {
        self.entries.clone()
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Notifications the host delivers to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    MessageAppended { index: usize },
    ChatReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    MessageAppended,
    ChatReset,
}

impl HostEvent {
    fn kind(&self) -> EventKind {
        match self {
            HostEvent::MessageAppended { .. } => EventKind::MessageAppended,
            HostEvent::ChatReset => EventKind::ChatReset,
        }
    }
}

type Handler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, (EventKind, Handler)>,
}

/// Handler registry the host emits into.
///
/// Handlers run synchronously on the emitting thread, in registration order.
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message_appended<F>(&self, handler: F) -> Subscription
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.register(EventKind::MessageAppended, move |event| {
            if let HostEvent::MessageAppended { index } = event {
                handler(*index);
            }
        })
    }

    pub fn on_chat_reset<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(EventKind::ChatReset, move |_| handler())
    }

    fn register<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.insert(id, (kind, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id: Some(id),
        }
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: HostEvent) {
        // Handlers may subscribe or detach, so call them outside the lock.
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .handlers
                .values()
                .filter(|(kind, _)| *kind == event.kind())
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };
        debug!("Emitting {:?} to {} handler(s)", event, handlers.len());
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

/// Registration handle. Dropping it detaches the handler.
#[must_use = "dropping a Subscription detaches its handler"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: Option<u64>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    pub fn detach(mut self) {
        self.release();
    }

    pub fn is_attached(&self) -> bool {
        self.id.is_some() && self.registry.strong_count() > 0
    }

    fn release(&mut self) {
        let Some(id) = self.id.take() else { return };
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
