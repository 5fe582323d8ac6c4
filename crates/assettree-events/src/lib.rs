use assettree_core::{CategoryId, ModelId};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod telemetry;

/// Change notifications published by the rendering surface and the dataset
/// owner. Tree sessions subscribe to these to invalidate derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// The underlying dataset was swapped or edited; structural indices are stale.
    DatasetChanged,

    // Rendering surface
    DisplayedModelsChanged {
        model_ids: Vec<ModelId>,
        displayed: bool,
    },
    AlwaysDrawnChanged {
        count: usize,
        exclusive: bool,
    },
    NeverDrawnChanged {
        count: usize,
    },
    CategoryOverridesChanged {
        model_id: ModelId,
        category_ids: Vec<CategoryId>,
    },
    EnabledCategoriesChanged,
    ViewContextChanged {
        spatial: bool,
    },
}

impl Event {
    /// Whether the event invalidates structural indices (as opposed to
    /// display state only).
    pub fn invalidates_structure(&self) -> bool {
        matches!(self, Event::DatasetChanged)
    }
}

/// Fan-out bus: every subscriber gets its own channel and sees every event
/// published after it subscribed. Events published with no subscriber are
/// dropped.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Sends `event` to every live subscriber; subscribers whose receiver
    /// was dropped are forgotten.
    pub fn publish(&self, event: Event) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Drains every pending event of `rx` into `listener`. Returns the number of
/// events handled.
pub fn dispatch_pending<L: EventListener>(rx: &Receiver<Event>, listener: &mut L) -> usize {
    let mut handled = 0;
    while let Ok(event) = rx.try_recv() {
        listener.handle_event(&event);
        handled += 1;
    }
    handled
}

/// Trait for components that respond to events.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
