//! Synchronous lifecycle notifications.
//!
//! Each event kind keeps an ordered list of subscribers; `on` appends and
//! every subscriber runs inline, in registration order, on the task that
//! caused the event. Handlers must return quickly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use strum::{Display, EnumString};

use crate::models::job::{Job, JobStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum EventKind {
    #[strum(serialize = "update")]
    Update,
    #[strum(serialize = "jobComplete")]
    JobComplete,
    #[strum(serialize = "allComplete")]
    AllComplete,
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Fired after every mutation with the full job list.
    Update { jobs: Vec<Job>, stats: JobStats },
    /// Fired once per job that reaches `done`.
    JobComplete(Job),
    /// Fired once at the end of each batch run.
    AllComplete(JobStats),
}

impl QueueEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::Update { .. } => EventKind::Update,
            QueueEvent::JobComplete(_) => EventKind::JobComplete,
            QueueEvent::AllComplete(_) => EventKind::AllComplete,
        }
    }
}

type Handler = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn emit(&self, event: &QueueEvent) {
        // Clone the list out so a handler may register further handlers.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            handler(event);
        }
    }
}
