// Renderer collaborator contract — the session orchestrates renderers but
// never owns their implementation.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::file::{FileDescriptor, Representation};
use crate::registry::RendererKind;

/// What a renderer should warm during a prefetch. `content` is false when the
/// prefetch is for a lightweight preload representation only.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchTargets {
    pub assets: bool,
    pub preload: bool,
    pub content: bool,
}

/// Events a renderer reports back to its session.
#[derive(Debug, Clone)]
pub enum RendererEvent {
    /// Load finished; an error payload means the render failed.
    Load { error: Option<String> },
    /// Generic renderer event stream relayed to session listeners.
    Viewer {
        name: String,
        payload: serde_json::Value,
    },
}

/// Everything a renderer gets at construction. The events sender reports back
/// to the owning session; senders of torn-down renderers go nowhere.
#[derive(Clone)]
pub struct RendererContext {
    pub file: FileDescriptor,
    pub representation: Option<Representation>,
    pub token: Option<String>,
    /// Set only for the error surface: the message to display.
    pub error_message: Option<String>,
    pub events: mpsc::UnboundedSender<RendererEvent>,
}

/// Contract for a concrete renderer. `load` kicks off rendering and reports
/// completion through the event channel; `prefetch` and `destroy` are
/// optional capabilities with no-op defaults.
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self);

    fn prefetch(&self, _targets: PrefetchTargets) {}

    fn destroy(&self) {}
}

/// Creates renderers for the closed set of renderer kinds. Supplied by the
/// host; the engine never constructs a concrete renderer itself.
pub trait RendererFactory: Send + Sync {
    fn create(&self, kind: RendererKind, context: RendererContext) -> Arc<dyn Renderer>;
}
