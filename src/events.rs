// Typed per-session event bus — explicit subscribe/unsubscribe, cleaned up by
// the teardown path rather than by drop order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::file::FileDescriptor;
use crate::session::SessionCounts;

/// Events the session fans out to host listeners.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A renderer was instantiated and attached.
    ViewerAttached { name: String },
    /// A render finished successfully.
    Load {
        file: FileDescriptor,
        counts: SessionCounts,
    },
    /// Navigation to another collection entry began.
    Navigate { file_id: String },
    /// An error occurred somewhere in the session; fatal errors additionally
    /// close the session, non-fatal ones (prefetch) are log-only.
    PreviewError {
        code: &'static str,
        message: String,
    },
    /// Renderer event relayed upward unchanged.
    ViewerEvent {
        name: String,
        payload: serde_json::Value,
    },
}

pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

pub struct EventBus {
    handlers: Mutex<Vec<(usize, EventHandler)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn on(&self, handler: impl Fn(&SessionEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));
        SubscriptionId(id)
    }

    pub fn off(&self, id: SubscriptionId) {
        self.handlers.lock().retain(|(hid, _)| *hid != id.0);
    }

    /// Handlers run outside the bus lock so they may subscribe/unsubscribe or
    /// call back into the session.
    pub fn emit(&self, event: &SessionEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_on_emit_off() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicU32::new(0));

        let seen_clone = Arc::clone(&seen);
        let sub = bus.on(move |_| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(&SessionEvent::Navigate {
            file_id: "f1".into(),
        });
        assert_eq!(seen.load(Ordering::Relaxed), 1);

        bus.off(sub);
        bus.emit(&SessionEvent::Navigate {
            file_id: "f2".into(),
        });
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
