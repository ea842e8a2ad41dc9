use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakoutEvent {
    /// The draft changed through a local edit.
    DraftChanged,
    /// A server push was folded into the draft.
    StateReconciled,
    ApplyingChanged(bool),
    /// `None` clears the status line.
    StatusChanged(Option<StatusMessage>),
    /// The manager was closed, e.g. because the user is changing meeting.
    Closed,
}

/// Short-lived confirmations shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    ParticipantsAssigned,
    ParticipantsAssignedRandomly,
    ChangesDiscarded,
}

impl StatusMessage {
    /// Translation key for the UI's i18n table.
    pub fn i18n_key(&self) -> &'static str {
        match self {
            Self::ParticipantsAssigned => "breakout_rooms.ephemeral_status.participants_assigned",
            Self::ParticipantsAssignedRandomly => {
                "breakout_rooms.ephemeral_status.participants_assigned_randomly"
            }
            Self::ChangesDiscarded => "breakout_rooms.ephemeral_status.changes_discarded",
        }
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait BreakoutEventListener: Send + Sync {
    fn on_event(&self, event: BreakoutEvent);
}

type Listeners = RwLock<Vec<(u64, Arc<dyn BreakoutEventListener>)>>;

/// Dispatches events to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<Listeners>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a listener until the returned handle is dropped.
    #[must_use = "dropping the handle unregisters the listener"]
    pub fn add_listener(&self, listener: Arc<dyn BreakoutEventListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().unwrap().push((id, listener));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn emit(&self, event: BreakoutEvent) {
        let listeners = self.listeners.read().unwrap();
        for (_, listener) in listeners.iter() {
            listener.on_event(event.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap().len()
    }
}

/// Subscription returned by [`EventEmitter::add_listener`].
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.write().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}
