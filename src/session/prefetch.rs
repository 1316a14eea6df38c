// Prefetch scheduling — warms metadata and renderer assets for upcoming
// collection entries without ever blocking or failing the active render.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::PREFETCH_COUNT;
use crate::error::PreviewError;
use crate::events::SessionEvent;
use crate::file::FileDescriptor;
use crate::renderer::{PrefetchTargets, RendererContext};
use crate::session::controller::SessionInner;
use crate::tokens::resolve_tokens;

/// Request for the standalone single-file prefetch entry point.
#[derive(Debug, Clone)]
pub struct PrefetchRequest {
    pub file_id: String,
    pub token: Option<String>,
    /// Warm only a lightweight preload representation, not full content.
    pub preload: bool,
}

/// Prefetch the next few collection entries after the current index.
///
/// Runs once per successful render, on its own task. One resolver call covers
/// the whole window; per-candidate failures are isolated and logged.
pub(crate) async fn prefetch_next(inner: Arc<SessionInner>) {
    let (candidates, credential) = {
        let st = inner.state.lock();
        if st.collection.len() < 2 || st.options.skip_server_update {
            return;
        }
        let Some(file) = &st.file else {
            return;
        };
        let Some(index) = st.collection.iter().position(|id| *id == file.id) else {
            return;
        };

        let end = (index + 1 + PREFETCH_COUNT).min(st.collection.len());
        let candidates: Vec<String> = st.collection[index + 1..end]
            .iter()
            .filter(|id| !st.prefetched.contains(*id))
            .cloned()
            .collect();
        (candidates, st.credential.clone())
    };

    if candidates.is_empty() {
        return;
    }
    let Some(credential) = credential else {
        return;
    };
    debug!("prefetch window candidates={:?}", candidates);

    let tokens = match resolve_tokens(&candidates, &credential).await {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!("prefetch token resolution failed: {}", err);
            inner.events.emit(&SessionEvent::PreviewError {
                code: "prefetch_error",
                message: format!("error prefetching files: {}", err),
            });
            return;
        }
    };

    for file_id in candidates {
        let token = tokens.get(&file_id).cloned();
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            prefetch_candidate(inner, file_id, token).await;
        });
    }
}

async fn prefetch_candidate(inner: Arc<SessionInner>, file_id: String, token: Option<String>) {
    match inner.api.file_info(&file_id, token.as_deref()).await {
        Ok(descriptor) => {
            inner.cache.put(&descriptor);
            {
                let mut st = inner.state.lock();
                st.prefetched.insert(file_id.clone());
            }
            if let Err(err) = warm_renderer(&inner, &descriptor, token, false) {
                debug!("prefetch warm skipped file_id={}: {}", file_id, err);
            }
        }
        Err(err) => {
            warn!("prefetch fetch failed file_id={}: {}", file_id, err);
            inner.events.emit(&SessionEvent::PreviewError {
                code: "prefetch_error",
                message: format!("error prefetching file {}: {}", file_id, err),
            });
        }
    }
}

/// Single-file warm-up for callers outside the session flow. Best effort:
/// works from cached metadata only, never raises.
pub(crate) fn prefetch_single(inner: &Arc<SessionInner>, request: PrefetchRequest) {
    let Some(descriptor) = inner.cache.get_valid(&request.file_id) else {
        debug!("prefetch skipped, no cached metadata file_id={}", request.file_id);
        return;
    };
    if let Err(err) = warm_renderer(inner, &descriptor, request.token, request.preload) {
        warn!("prefetch failed file_id={}: {}", request.file_id, err);
        inner.events.emit(&SessionEvent::PreviewError {
            code: "prefetch_error",
            message: format!("error prefetching file {}: {}", request.file_id, err),
        });
    }
}

/// Warm static assets for the named viewer capabilities, no file involved.
pub(crate) fn prefetch_viewers(inner: &Arc<SessionInner>, names: &[&str]) {
    let registry = {
        let st = inner.state.lock();
        Arc::clone(&st.registry)
    };
    for viewer in registry.viewers() {
        if !names.contains(&viewer.name.as_str()) {
            continue;
        }
        let (tx, _rx) = mpsc::unbounded_channel();
        let context = RendererContext {
            file: FileDescriptor::bare(""),
            representation: None,
            token: None,
            error_message: None,
            events: tx,
        };
        let renderer = inner.renderers.create(viewer.kind, context);
        renderer.prefetch(PrefetchTargets {
            assets: true,
            preload: false,
            content: false,
        });
    }
}

/// Select a renderer for the descriptor and instruct it to warm its assets
/// and (unless preloading) its content representation. Pure selection — the
/// registry lookups have no side effects.
fn warm_renderer(
    inner: &Arc<SessionInner>,
    descriptor: &FileDescriptor,
    token: Option<String>,
    preload: bool,
) -> Result<(), PreviewError> {
    let (registry, disabled) = {
        let st = inner.state.lock();
        (Arc::clone(&st.registry), st.disabled_viewers.clone())
    };

    let loader = registry
        .determine_loader(descriptor, &disabled)
        .ok_or_else(|| PreviewError::UnsupportedType(descriptor.extension.clone()))?;
    let viewer = loader
        .determine_viewer(descriptor, &disabled)
        .ok_or_else(|| PreviewError::UnsupportedType(descriptor.extension.clone()))?;
    let representation = loader.determine_representation(descriptor, viewer).cloned();

    // Events from prefetch-only renderer instances go nowhere.
    let (tx, _rx) = mpsc::unbounded_channel();
    let context = RendererContext {
        file: descriptor.clone(),
        representation,
        token,
        error_message: None,
        events: tx,
    };
    let renderer = inner.renderers.create(viewer.kind, context);
    renderer.prefetch(PrefetchTargets {
        assets: true,
        preload,
        content: !preload,
    });
    Ok(())
}
