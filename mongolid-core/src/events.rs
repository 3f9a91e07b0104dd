//! Model lifecycle events.
//!
//! Every write fires a "before" event with halting semantics (a listener
//! returning `false` aborts the write) and, only after an acknowledged write
//! that actually changed data, the matching "after" event.
//!
//! Event names are `"{event}: {ModelType}"`, e.g. `"saving: User"`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::model::Model;

/// Lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    /// Before `save`.
    Saving,
    /// After a successful `save`.
    Saved,
    /// Before `insert`.
    Inserting,
    /// After a successful `insert`.
    Inserted,
    /// Before `update`.
    Updating,
    /// After a successful `update`.
    Updated,
    /// Before `delete`.
    Deleting,
    /// After a successful `delete`.
    Deleted,
}

impl ModelEvent {
    /// Event verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Inserting => "inserting",
            Self::Inserted => "inserted",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// Whether listeners may halt the operation.
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            Self::Saving | Self::Inserting | Self::Updating | Self::Deleting
        )
    }

    /// Full event name for a model type.
    pub fn name_for(&self, model_type: &str) -> String {
        format!("{}: {model_type}", self.as_str())
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives lifecycle events.
pub trait EventDispatcher: Send + Sync {
    /// Fire an event. With `halt` set, returns `false` when a listener asks
    /// to abort.
    fn fire(&self, event: ModelEvent, model: &Model, halt: bool) -> bool;
}

/// Dispatcher that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl EventDispatcher for NullDispatcher {
    fn fire(&self, _event: ModelEvent, _model: &Model, _halt: bool) -> bool {
        true
    }
}

type Listener = Arc<dyn Fn(&Model) -> bool + Send + Sync>;

/// Dispatcher calling registered closures by event name.
#[derive(Default)]
pub struct EventRegistry {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for an event on one model type.
    pub fn listen<F>(&self, event: ModelEvent, model_type: &str, listener: F) -> &Self
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.listen_to(event.name_for(model_type), listener)
    }

    /// Listen for an event by full name.
    pub fn listen_to<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Whether any listener is registered under a name.
    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners.read().get(name).is_some_and(|l| !l.is_empty())
    }

    /// Remove every listener registered under a name.
    pub fn forget(&self, name: &str) {
        self.listeners.write().remove(name);
    }
}

impl EventDispatcher for EventRegistry {
    fn fire(&self, event: ModelEvent, model: &Model, halt: bool) -> bool {
        let name = event.name_for(model.model_type().name());
        // Listeners run outside the lock so they may register others.
        let listeners = match self.listeners.read().get(&name) {
            Some(listeners) => listeners.clone(),
            None => return true,
        };

        for listener in listeners {
            if !listener(model) && halt {
                debug!(event = %name, "Listener halted event");
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventRegistry")
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
