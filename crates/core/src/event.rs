//! Typed agent event bus.
//!
//! Lifecycle events are a closed set of variants rather than free-form
//! string keys, so a subscriber can match exhaustively and a typo cannot
//! silently subscribe to nothing. Observers register under one
//! [`EventKind`] or under the wildcard; publishing dispatches kind-specific
//! observers first, then wildcard observers, each in registration order,
//! synchronously on the publisher's thread. No panic isolation is provided:
//! an observer failure propagates to the publisher.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::message::{Message, ToolCall, ToolResult};
use crate::retrieval::Document;

/// Everything the framework announces during an agent operation.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    ChatStart,
    ChatStop,
    StreamStart,
    StreamStop,
    /// About to append a response to the chat history.
    MessageSaving(Message),
    /// A response was appended to the chat history.
    MessageSaved(Message),
    /// A tool is about to execute.
    ToolCalling(ToolCall),
    /// A tool finished executing.
    ToolCalled(ToolResult),
    VectorStoreSearching {
        query: String,
    },
    VectorStoreResult {
        query: String,
        documents: Vec<Document>,
    },
    InstructionsChanging {
        instructions: String,
    },
    InstructionsChanged {
        previous: String,
        current: String,
    },
    RagStart,
    RagStop,
    /// An operation failed; the wrapped error is re-raised to the caller
    /// after this event fires.
    Error {
        message: String,
    },
}

/// Field-less projection of [`AgentEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatStart,
    ChatStop,
    StreamStart,
    StreamStop,
    MessageSaving,
    MessageSaved,
    ToolCalling,
    ToolCalled,
    VectorStoreSearching,
    VectorStoreResult,
    InstructionsChanging,
    InstructionsChanged,
    RagStart,
    RagStop,
    Error,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::ChatStart => EventKind::ChatStart,
            AgentEvent::ChatStop => EventKind::ChatStop,
            AgentEvent::StreamStart => EventKind::StreamStart,
            AgentEvent::StreamStop => EventKind::StreamStop,
            AgentEvent::MessageSaving(_) => EventKind::MessageSaving,
            AgentEvent::MessageSaved(_) => EventKind::MessageSaved,
            AgentEvent::ToolCalling(_) => EventKind::ToolCalling,
            AgentEvent::ToolCalled(_) => EventKind::ToolCalled,
            AgentEvent::VectorStoreSearching { .. } => EventKind::VectorStoreSearching,
            AgentEvent::VectorStoreResult { .. } => EventKind::VectorStoreResult,
            AgentEvent::InstructionsChanging { .. } => EventKind::InstructionsChanging,
            AgentEvent::InstructionsChanged { .. } => EventKind::InstructionsChanged,
            AgentEvent::RagStart => EventKind::RagStart,
            AgentEvent::RagStop => EventKind::RagStop,
            AgentEvent::Error { .. } => EventKind::Error,
        }
    }
}

/// A subscriber to agent lifecycle events.
pub trait Observer: Send + Sync {
    fn update(&self, event: &AgentEvent);
}

#[derive(Default)]
struct Registry {
    by_kind: HashMap<EventKind, Vec<Arc<dyn Observer>>>,
    wildcard: Vec<Arc<dyn Observer>>,
}

/// The subscription registry.
///
/// The registration snapshot is taken before dispatch, so an observer may
/// subscribe or unsubscribe from inside `update` without deadlocking; the
/// change takes effect from the next `publish`.
pub struct EventBus {
    registry: RwLock<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Register an observer for one event kind, or for every event when
    /// `kind` is `None`. The same observer may be registered more than once
    /// and will then be invoked once per registration.
    pub fn subscribe(&self, observer: Arc<dyn Observer>, kind: Option<EventKind>) {
        let mut registry = self.registry.write().expect("event registry poisoned");
        match kind {
            Some(kind) => registry.by_kind.entry(kind).or_default().push(observer),
            None => registry.wildcard.push(observer),
        }
    }

    /// Remove the observer's registrations under the given key only.
    /// Registrations of the same observer under other kinds are untouched.
    pub fn unsubscribe(&self, observer: &Arc<dyn Observer>, kind: Option<EventKind>) {
        let mut registry = self.registry.write().expect("event registry poisoned");
        match kind {
            Some(kind) => {
                if let Some(group) = registry.by_kind.get_mut(&kind) {
                    group.retain(|candidate| !same_observer(candidate, observer));
                }
            }
            None => registry
                .wildcard
                .retain(|candidate| !same_observer(candidate, observer)),
        }
    }

    /// Deliver an event: kind-specific observers first, then wildcard
    /// observers, in registration order.
    pub fn publish(&self, event: &AgentEvent) {
        let targets: Vec<Arc<dyn Observer>> = {
            let registry = self.registry.read().expect("event registry poisoned");
            let mut targets = registry
                .by_kind
                .get(&event.kind())
                .cloned()
                .unwrap_or_default();
            targets.extend(registry.wildcard.iter().cloned());
            targets
        };

        for target in targets {
            target.update(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    // Compare data pointers only; fat-pointer comparison can be spurious
    // when the same type has multiple vtable instantiations.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Recorder {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn names(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    impl Observer for Recorder {
        fn update(&self, event: &AgentEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((format!("{:?}", event.kind()), self.label.to_string()));
        }
    }

    #[test]
    fn wildcard_receives_every_event() {
        let bus = EventBus::new();
        let recorder = Recorder::new("w");
        bus.subscribe(recorder.clone(), None);

        bus.publish(&AgentEvent::ChatStart);
        bus.publish(&AgentEvent::RagStop);
        bus.publish(&AgentEvent::Error {
            message: "boom".into(),
        });

        assert_eq!(recorder.names(), vec!["ChatStart", "RagStop", "Error"]);
    }

    #[test]
    fn kind_subscription_filters_other_kinds() {
        let bus = EventBus::new();
        let recorder = Recorder::new("k");
        bus.subscribe(recorder.clone(), Some(EventKind::ChatStop));

        bus.publish(&AgentEvent::ChatStart);
        bus.publish(&AgentEvent::ChatStop);
        bus.publish(&AgentEvent::StreamStop);

        assert_eq!(recorder.names(), vec!["ChatStop"]);
    }

    #[test]
    fn kind_specific_runs_before_wildcard() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        struct Tagger {
            tag: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Observer for Tagger {
            fn update(&self, _event: &AgentEvent) {
                self.order.lock().unwrap().push(self.tag);
            }
        }

        let bus = EventBus::new();
        bus.subscribe(
            Arc::new(Tagger {
                tag: "wildcard",
                order: order.clone(),
            }),
            None,
        );
        bus.subscribe(
            Arc::new(Tagger {
                tag: "specific",
                order: order.clone(),
            }),
            Some(EventKind::ChatStart),
        );

        bus.publish(&AgentEvent::ChatStart);
        assert_eq!(*order.lock().unwrap(), vec!["specific", "wildcard"]);
    }

    #[test]
    fn double_registration_is_invoked_twice() {
        let bus = EventBus::new();
        let recorder = Recorder::new("d");
        bus.subscribe(recorder.clone(), Some(EventKind::ChatStart));
        bus.subscribe(recorder.clone(), None);

        bus.publish(&AgentEvent::ChatStart);
        assert_eq!(recorder.names().len(), 2);
    }

    #[test]
    fn unsubscribe_removes_only_matching_registration() {
        let bus = EventBus::new();
        let first = Recorder::new("first");
        let second = Recorder::new("second");
        bus.subscribe(first.clone(), Some(EventKind::ChatStart));
        bus.subscribe(second.clone(), Some(EventKind::ChatStart));

        let handle: Arc<dyn Observer> = first.clone();
        bus.unsubscribe(&handle, Some(EventKind::ChatStart));

        bus.publish(&AgentEvent::ChatStart);
        assert!(first.names().is_empty());
        assert_eq!(second.names(), vec!["ChatStart"]);
    }

    #[test]
    fn unsubscribe_is_scoped_to_the_given_kind() {
        let bus = EventBus::new();
        let recorder = Recorder::new("scoped");
        bus.subscribe(recorder.clone(), Some(EventKind::ChatStart));
        bus.subscribe(recorder.clone(), None);

        let handle: Arc<dyn Observer> = recorder.clone();
        bus.unsubscribe(&handle, Some(EventKind::ChatStart));

        bus.publish(&AgentEvent::ChatStart);
        // The wildcard registration survives.
        assert_eq!(recorder.names(), vec!["ChatStart"]);
    }

    #[test]
    fn observer_may_unsubscribe_during_publish() {
        struct OneShot {
            fired: Mutex<u32>,
        }
        impl Observer for OneShot {
            fn update(&self, _event: &AgentEvent) {
                *self.fired.lock().unwrap() += 1;
            }
        }

        let bus = Arc::new(EventBus::new());
        let observer = Arc::new(OneShot {
            fired: Mutex::new(0),
        });
        bus.subscribe(observer.clone(), None);

        struct Detacher {
            bus: Arc<EventBus>,
            target: Arc<dyn Observer>,
        }
        impl Observer for Detacher {
            fn update(&self, _event: &AgentEvent) {
                self.bus.unsubscribe(&self.target, None);
            }
        }

        let target: Arc<dyn Observer> = observer.clone();
        bus.subscribe(
            Arc::new(Detacher {
                bus: bus.clone(),
                target,
            }),
            None,
        );

        // No deadlock: the snapshot was taken before dispatch, so the
        // one-shot observer still sees this event but not the next.
        bus.publish(&AgentEvent::ChatStart);
        bus.publish(&AgentEvent::ChatStart);
        assert_eq!(*observer.fired.lock().unwrap(), 1);
    }
}
