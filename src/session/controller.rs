// Session controller — the state machine coordinating cache, credentials,
// network revalidation, viewer selection, retries, and prefetch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::MetadataClient;
use crate::cache::MetadataCache;
use crate::config::{PreviewOptions, DEFAULT_DISABLED_VIEWERS};
use crate::error::PreviewError;
use crate::events::{EventBus, SessionEvent};
use crate::file::{FileDescriptor, Permission};
use crate::registry::{RendererKind, ViewerRegistry};
use crate::renderer::{Renderer, RendererContext, RendererEvent, RendererFactory};
use crate::session::prefetch::{self, PrefetchRequest};
use crate::session::retry::RetryPolicy;
use crate::session::SessionCounts;
use crate::tokens::{self, CredentialSource};
use crate::ui::{NoopUi, UiShell};

/// The active renderer plus the task pumping its events.
pub(crate) struct RendererHandle {
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) pump: JoinHandle<()>,
}

pub(crate) struct SessionState {
    /// True from the start of a load until hide/destroy or a fatal error.
    pub(crate) open: bool,
    /// Active descriptor, or a bare placeholder before the first fetch.
    pub(crate) file: Option<FileDescriptor>,
    pub(crate) credential: Option<CredentialSource>,
    pub(crate) options: PreviewOptions,
    pub(crate) registry: Arc<ViewerRegistry>,
    pub(crate) disabled_viewers: HashSet<String>,
    pub(crate) token: Option<String>,
    pub(crate) collection: Vec<String>,
    /// Resets to zero whenever the target identifier changes; increments when
    /// the same identifier is reloaded.
    pub(crate) retry_count: u32,
    /// At most one pending retry timer per session.
    pub(crate) retry_timer: Option<CancellationToken>,
    /// At most one renderer attached at a time.
    pub(crate) renderer: Option<RendererHandle>,
    /// Identifiers already warmed; grows monotonically, survives collection
    /// replacement.
    pub(crate) prefetched: HashSet<String>,
    pub(crate) counts: SessionCounts,
    pub(crate) load_started: Option<Instant>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            open: false,
            file: None,
            credential: None,
            options: PreviewOptions::default(),
            registry: Arc::new(ViewerRegistry::default()),
            disabled_viewers: DEFAULT_DISABLED_VIEWERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            token: None,
            collection: Vec::new(),
            retry_count: 0,
            retry_timer: None,
            renderer: None,
            prefetched: HashSet::new(),
            counts: SessionCounts::default(),
            load_started: None,
        }
    }
}

/// Sole cancellation mechanism: asynchronous results mutate the session only
/// while it is open and still targeting the same identifier. In-flight
/// requests are never aborted at the transport level.
pub(crate) fn accepts_result(state: &SessionState, file_id: &str) -> bool {
    state.open && state.file.as_ref().is_some_and(|f| f.id == file_id)
}

pub(crate) struct SessionInner {
    pub(crate) api: Arc<dyn MetadataClient>,
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) renderers: Arc<dyn RendererFactory>,
    pub(crate) ui: Arc<dyn UiShell>,
    pub(crate) events: EventBus,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) state: Mutex<SessionState>,
}

/// Handle to one preview session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct PreviewSession {
    inner: Arc<SessionInner>,
}

impl PreviewSession {
    pub fn new(api: Arc<dyn MetadataClient>, renderers: Arc<dyn RendererFactory>) -> Self {
        Self::with_deps(
            api,
            renderers,
            Arc::new(NoopUi),
            MetadataCache::new(),
            RetryPolicy::metadata(),
        )
    }

    pub fn with_deps(
        api: Arc<dyn MetadataClient>,
        renderers: Arc<dyn RendererFactory>,
        ui: Arc<dyn UiShell>,
        cache: MetadataCache,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                cache: Arc::new(cache),
                renderers,
                ui,
                events: EventBus::new(),
                retry_policy,
                state: Mutex::new(SessionState::new()),
            }),
        }
    }

    /// Session event fan-out; subscribe before `show` to observe the first load.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Begin previewing `file_id` with the given credential source and options.
    pub fn show(&self, file_id: &str, credential: CredentialSource, options: PreviewOptions) {
        {
            let mut st = self.inner.state.lock();
            st.credential = Some(credential);
            st.registry = Arc::new(ViewerRegistry::new(options.loaders.clone()));

            let mut disabled: HashSet<String> = DEFAULT_DISABLED_VIEWERS
                .iter()
                .map(|s| s.to_string())
                .collect();
            disabled.extend(options.disabled_viewers.iter().cloned());
            st.disabled_viewers = disabled;

            st.collection = options.collection.clone();
            st.options = options;
        }
        self.inner.load(file_id);
    }

    /// Load a file by id using the previously recorded credential source.
    pub fn load(&self, file_id: &str) {
        self.inner.load(file_id);
    }

    /// Re-render the current file. With `skip_server_update` the cached
    /// descriptor is re-rendered as-is (no-op unless currently valid);
    /// otherwise the file is re-loaded from the server.
    pub fn reload(&self, skip_server_update: bool) {
        if skip_server_update {
            let file_id = {
                let st = self.inner.state.lock();
                st.file
                    .as_ref()
                    .filter(|f| f.is_valid())
                    .map(|f| f.id.clone())
            };
            let Some(file_id) = file_id else {
                return;
            };
            if let Err(err) = self.inner.load_viewer(&file_id) {
                self.inner.trigger_error(err);
            }
        } else {
            let file_id = {
                let st = self.inner.state.lock();
                st.file.as_ref().map(|f| f.id.clone())
            };
            if let Some(file_id) = file_id {
                self.inner.load(&file_id);
            }
        }
    }

    /// Replace the browsing collection atomically. The prefetched set is
    /// deliberately kept: prefetch cost is sunk, not reclaimed.
    pub fn update_collection(&self, collection: Vec<String>) {
        let active = {
            let mut st = self.inner.state.lock();
            st.collection = collection.clone();
            if st.open {
                st.file.as_ref().map(|f| f.id.clone())
            } else {
                None
            }
        };
        if let Some(file_id) = active {
            self.inner.ui.show_navigation(&file_id, &collection);
        }
    }

    /// Bulk cache warmer for metadata the host already has. Watermarked
    /// descriptors are skipped, invalid ones are reported and dropped.
    pub fn update_file_cache(&self, descriptors: &[FileDescriptor]) {
        for descriptor in descriptors {
            if descriptor.watermarked {
                debug!("skipping watermarked file in cache update file_id={}", descriptor.id);
                continue;
            }
            if descriptor.is_valid() {
                self.inner.cache.put(descriptor);
            } else {
                warn!("tried to cache invalid file file_id={}", descriptor.id);
                self.inner.events.emit(&SessionEvent::PreviewError {
                    code: "invalid_cache_attempt",
                    message: format!("tried to cache invalid file {}", descriptor.id),
                });
            }
        }
    }

    /// Swap the credential source, optionally reloading the current file.
    pub fn update_token(&self, credential: CredentialSource, reload: bool) {
        {
            let mut st = self.inner.state.lock();
            st.credential = Some(credential);
        }
        if reload {
            self.reload(false);
        }
    }

    pub fn navigate_left(&self) {
        let target = {
            let st = self.inner.state.lock();
            current_index(&st).and_then(|index| {
                let new_index = index.saturating_sub(1);
                (new_index != index).then_some(new_index)
            })
        };
        if let Some(index) = target {
            self.navigate_to_index(index);
        }
    }

    pub fn navigate_right(&self) {
        let target = {
            let st = self.inner.state.lock();
            current_index(&st).and_then(|index| {
                let last = st.collection.len().saturating_sub(1);
                let new_index = (index + 1).min(last);
                (new_index != index).then_some(new_index)
            })
        };
        if let Some(index) = target {
            self.navigate_to_index(index);
        }
    }

    /// Preview the file at `index` in the current collection.
    pub fn navigate_to_index(&self, index: usize) {
        let target = {
            let mut st = self.inner.state.lock();
            if st.collection.len() < 2 {
                return;
            }
            let Some(target) = st.collection.get(index).cloned() else {
                return;
            };
            st.counts.navigation += 1;
            target
        };
        self.inner.events.emit(&SessionEvent::Navigate {
            file_id: target.clone(),
        });
        self.inner.load(&target);
    }

    pub fn disable_viewers(&self, names: &[&str]) {
        let mut st = self.inner.state.lock();
        st.disabled_viewers.extend(names.iter().map(|n| n.to_string()));
    }

    pub fn enable_viewers(&self, names: &[&str]) {
        let mut st = self.inner.state.lock();
        for name in names {
            st.disabled_viewers.remove(*name);
        }
    }

    /// Names of every registered viewer capability, in match order.
    pub fn viewers(&self) -> Vec<String> {
        let st = self.inner.state.lock();
        st.registry.viewers().map(|v| v.name.clone()).collect()
    }

    /// Best-effort single-file warm-up outside the session flow. Never
    /// touches the session's prefetched set; all errors are logged, not
    /// raised.
    pub fn prefetch(&self, request: PrefetchRequest) {
        prefetch::prefetch_single(&self.inner, request);
    }

    /// Warm static assets for the named viewer capabilities.
    pub fn prefetch_viewers(&self, names: &[&str]) {
        prefetch::prefetch_viewers(&self.inner, names);
    }

    pub fn current_file(&self) -> Option<FileDescriptor> {
        self.inner.state.lock().file.clone()
    }

    pub fn collection(&self) -> Vec<String> {
        self.inner.state.lock().collection.clone()
    }

    pub fn counts(&self) -> SessionCounts {
        self.inner.state.lock().counts
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// Tear down the active renderer and close the session.
    pub fn hide(&self) {
        self.inner.hide();
    }

    /// `hide` plus removal of all event subscribers.
    pub fn destroy(&self) {
        self.inner.hide();
        self.inner.events.clear();
    }
}

impl SessionInner {
    /// Begin loading `file_id`. The renderer teardown and retry bookkeeping
    /// happen synchronously before any asynchronous step starts.
    pub(crate) fn load(self: &Arc<Self>, file_id: &str) {
        let (handle, credential) = {
            let mut st = self.state.lock();
            let handle = st.renderer.take();
            st.open = true;
            st.load_started = Some(Instant::now());
            if let Some(timer) = st.retry_timer.take() {
                timer.cancel();
            }

            let previous_id = st.file.as_ref().map(|f| f.id.clone());
            if previous_id.as_deref() == Some(file_id) {
                st.retry_count += 1;
            } else {
                st.retry_count = 0;
            }

            // Optimistic placeholder: cached descriptor if one is valid.
            st.file = Some(
                self.cache
                    .get_valid(file_id)
                    .unwrap_or_else(|| FileDescriptor::bare(file_id)),
            );
            debug!("load start file_id={} retry_count={}", file_id, st.retry_count);
            (handle, st.credential.clone())
        };
        teardown(handle);
        self.ui.show_loading_indicator();

        let Some(credential) = credential else {
            // load() before show(): no credential source was ever recorded.
            self.trigger_error(PreviewError::BadCredential(
                "no credential source configured",
            ));
            return;
        };

        let inner = Arc::clone(self);
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            let ids = vec![file_id.clone()];
            match tokens::resolve_tokens(&ids, &credential).await {
                Ok(token_map) => inner.load_with_credential(&file_id, token_map).await,
                Err(err @ (PreviewError::BadCredential(_) | PreviewError::MissingToken(_))) => {
                    inner.trigger_error(err);
                }
                Err(err) => inner.handle_fetch_error(&file_id, err),
            }
        });
    }

    /// Continue the load once credentials are known. A retry skips the cache:
    /// the previous cache-assisted attempt already failed.
    async fn load_with_credential(
        self: &Arc<Self>,
        file_id: &str,
        token_map: HashMap<String, String>,
    ) {
        let (use_cache, skip_server_update) = {
            let mut st = self.state.lock();
            if !accepts_result(&st, file_id) {
                return;
            }
            st.token = token_map.get(file_id).cloned();
            (st.retry_count == 0, st.options.skip_server_update)
        };

        if use_cache {
            if let Some(cached) = self.cache.get_valid(file_id) {
                {
                    let mut st = self.state.lock();
                    if !accepts_result(&st, file_id) {
                        return;
                    }
                    st.file = Some(cached);
                }
                debug!("cache hit file_id={}", file_id);
                if let Err(err) = self.load_viewer(file_id) {
                    self.trigger_error(err);
                    return;
                }
                if skip_server_update {
                    return;
                }
                // Unconditional revalidation against the network.
                self.load_from_server(file_id).await;
                return;
            }
        }

        if skip_server_update {
            self.trigger_error(PreviewError::Fetch(anyhow::anyhow!(
                "no cached metadata for file {} with server updates disabled",
                file_id
            )));
            return;
        }
        self.load_from_server(file_id).await;
    }

    async fn load_from_server(self: &Arc<Self>, file_id: &str) {
        let token = self.state.lock().token.clone();
        let started = Instant::now();
        match self.api.file_info(file_id, token.as_deref()).await {
            Ok(descriptor) => {
                debug!(
                    "file info fetched file_id={} elapsed_ms={}",
                    file_id,
                    started.elapsed().as_millis()
                );
                self.handle_network_descriptor(descriptor);
            }
            Err(err) => self.handle_fetch_error(file_id, PreviewError::Fetch(err)),
        }
    }

    /// Accept or discard a network descriptor, update the cache, and decide
    /// whether a (re-)render is needed.
    pub(crate) fn handle_network_descriptor(self: &Arc<Self>, descriptor: FileDescriptor) {
        #[derive(PartialEq)]
        enum Render {
            First,
            Stale,
            Skip,
        }

        let decision = {
            let mut st = self.state.lock();
            if !accepts_result(&st, &descriptor.id) {
                debug!("stale network response discarded file_id={}", descriptor.id);
                return;
            }
            let cached_before = self.cache.get_valid(&descriptor.id);
            st.file = Some(descriptor.clone());
            match cached_before {
                None => Render::First,
                Some(cached)
                    if cached.version != descriptor.version || descriptor.watermarked =>
                {
                    Render::Stale
                }
                Some(_) => Render::Skip,
            }
        };

        // Watermarked descriptors are evicted rather than stored.
        self.cache.put(&descriptor);

        match decision {
            Render::First => {
                if let Err(err) = self.load_viewer(&descriptor.id) {
                    self.trigger_error(err);
                }
            }
            Render::Stale => {
                info!("cached metadata stale, reloading viewer file_id={}", descriptor.id);
                if let Err(err) = self.load_viewer(&descriptor.id) {
                    self.trigger_error(err);
                }
            }
            Render::Skip => {
                debug!("revalidation no-op file_id={}", descriptor.id);
            }
        }
    }

    /// Pick a loader and renderer for `file_id`'s descriptor and attach it.
    /// Tears down any previously attached renderer first, so at most one is
    /// ever live. A no-op when the session has moved on to another target.
    pub(crate) fn load_viewer(self: &Arc<Self>, file_id: &str) -> Result<(), PreviewError> {
        let (handle, file, registry, disabled, token) = {
            let mut st = self.state.lock();
            if !accepts_result(&st, file_id) {
                debug!("viewer load for superseded target skipped file_id={}", file_id);
                return Ok(());
            }
            let Some(file) = st.file.clone() else {
                return Ok(());
            };
            (
                st.renderer.take(),
                file,
                Arc::clone(&st.registry),
                st.disabled_viewers.clone(),
                st.token.clone(),
            )
        };
        teardown(handle);

        if !file.allows(Permission::Preview) {
            return Err(PreviewError::PermissionDenied(file.id));
        }

        let loader = registry
            .determine_loader(&file, &disabled)
            .ok_or_else(|| PreviewError::UnsupportedType(file.extension.clone()))?;
        let viewer = loader
            .determine_viewer(&file, &disabled)
            .ok_or_else(|| PreviewError::UnsupportedType(file.extension.clone()))?;
        let representation = loader.determine_representation(&file, viewer).cloned();

        let (tx, rx) = mpsc::unbounded_channel();
        let context = RendererContext {
            file: file.clone(),
            representation,
            token,
            error_message: None,
            events: tx,
        };
        let renderer = self.renderers.create(viewer.kind, context);

        let pump = tokio::spawn(Self::pump_renderer_events(
            Arc::clone(self),
            Arc::clone(&renderer),
            rx,
        ));
        {
            let mut st = self.state.lock();
            if !accepts_result(&st, file_id) {
                // Session closed or retargeted between the checks; drop the
                // new renderer.
                renderer.destroy();
                pump.abort();
                return Ok(());
            }
            st.renderer = Some(RendererHandle {
                renderer: Arc::clone(&renderer),
                pump,
            });
        }

        renderer.load();
        info!("viewer attached name={} file_id={}", viewer.name, file.id);
        self.events.emit(&SessionEvent::ViewerAttached {
            name: viewer.name.clone(),
        });
        Ok(())
    }

    /// Relay events from the attached renderer; stops as soon as the renderer
    /// is no longer the current one.
    async fn pump_renderer_events(
        inner: Arc<SessionInner>,
        renderer: Arc<dyn Renderer>,
        mut rx: mpsc::UnboundedReceiver<RendererEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if !inner.renderer_is_current(&renderer) {
                break;
            }
            match event {
                RendererEvent::Load { error: None } => inner.finish_loading(),
                RendererEvent::Load { error: Some(message) } => {
                    inner.trigger_error(PreviewError::Renderer(message));
                }
                RendererEvent::Viewer { name, payload } => {
                    inner.events.emit(&SessionEvent::ViewerEvent { name, payload });
                }
            }
        }
    }

    fn renderer_is_current(&self, renderer: &Arc<dyn Renderer>) -> bool {
        let st = self.state.lock();
        st.renderer
            .as_ref()
            .is_some_and(|h| Arc::ptr_eq(&h.renderer, renderer))
    }

    /// Successful render: reset the retry counter, notify listeners, send the
    /// preview beacon, and kick off prefetch of upcoming files.
    fn finish_loading(self: &Arc<Self>) {
        let snapshot = {
            let mut st = self.state.lock();
            if !st.open {
                return;
            }
            let Some(file) = st.file.clone() else {
                return;
            };
            st.retry_count = 0;
            st.counts.success += 1;
            let elapsed_ms = st
                .load_started
                .take()
                .map(|t| t.elapsed().as_millis())
                .unwrap_or(0);
            (
                file,
                st.counts,
                elapsed_ms,
                st.options.skip_server_update,
                st.options.disable_event_log,
                st.token.clone(),
            )
        };
        let (file, counts, elapsed_ms, skip_server_update, disable_event_log, token) = snapshot;

        info!("preview loaded file_id={} elapsed_ms={}", file.id, elapsed_ms);
        self.ui.hide_loading_indicator();
        self.events.emit(&SessionEvent::Load {
            file: file.clone(),
            counts,
        });

        if !skip_server_update && !disable_event_log {
            let api = Arc::clone(&self.api);
            let file_id = file.id.clone();
            tokio::spawn(async move {
                send_preview_beacon(api, file_id, token, RetryPolicy::beacon()).await;
            });
        }

        if !skip_server_update {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                prefetch::prefetch_next(inner).await;
            });
        }
    }

    /// Failed metadata fetch: evict the identifier and either schedule the
    /// single pending retry or give up with a fatal error.
    pub(crate) fn handle_fetch_error(self: &Arc<Self>, file_id: &str, err: PreviewError) {
        let scheduled = {
            let mut st = self.state.lock();
            if !accepts_result(&st, file_id) {
                debug!("fetch error for stale load ignored file_id={}", file_id);
                return;
            }
            // Stale data is worse than no data.
            self.cache.evict(file_id);

            let attempt = st.retry_count + 1;
            match self.retry_policy.delay_for(attempt) {
                None => None,
                Some(delay) => {
                    if let Some(timer) = st.retry_timer.take() {
                        timer.cancel();
                    }
                    let cancel = CancellationToken::new();
                    st.retry_timer = Some(cancel.clone());
                    Some((delay, cancel, attempt))
                }
            }
        };

        match scheduled {
            None => {
                warn!("file info retries exhausted file_id={}: {}", file_id, err);
                self.trigger_error(PreviewError::RetriesExhausted {
                    file_id: file_id.to_string(),
                    attempts: self.retry_policy.max_attempts,
                });
            }
            Some((delay, cancel, attempt)) => {
                warn!(
                    "file info fetch failed file_id={} attempt={} retry_in_ms={}: {}",
                    file_id,
                    attempt,
                    delay.as_millis(),
                    err
                );
                let inner = Arc::clone(self);
                let file_id = file_id.to_string();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let still_current = {
                                let st = inner.state.lock();
                                accepts_result(&st, &file_id)
                            };
                            if still_current {
                                inner.load(&file_id);
                            }
                        }
                    }
                });
            }
        }
    }

    /// Fatal error path: close the session, evict the identifier, tear down
    /// the renderer, and show the error surface.
    pub(crate) fn trigger_error(self: &Arc<Self>, err: PreviewError) {
        let (handle, file) = {
            let mut st = self.state.lock();
            if !st.open {
                return;
            }
            st.open = false;
            st.counts.error += 1;
            if let Some(timer) = st.retry_timer.take() {
                timer.cancel();
            }
            (st.renderer.take(), st.file.clone())
        };
        // Listeners hear about the error exactly once, on the transition to
        // closed.
        self.events.emit(&SessionEvent::PreviewError {
            code: err.code(),
            message: err.to_string(),
        });
        teardown(handle);
        error!("preview failed code={}: {}", err.code(), err);

        if let Some(file) = &file {
            self.cache.evict(&file.id);
        }

        // Error surface is itself a renderer so hosts style it like any other.
        let (tx, rx) = mpsc::unbounded_channel();
        let context = RendererContext {
            file: file.unwrap_or_else(|| FileDescriptor::bare("")),
            representation: None,
            token: None,
            error_message: Some(err.display_message()),
            events: tx,
        };
        let renderer = self.renderers.create(RendererKind::Error, context);
        let pump = tokio::spawn(Self::pump_renderer_events(
            Arc::clone(self),
            Arc::clone(&renderer),
            rx,
        ));
        {
            let mut st = self.state.lock();
            st.renderer = Some(RendererHandle {
                renderer: Arc::clone(&renderer),
                pump,
            });
        }
        renderer.load();
        self.ui.hide_loading_indicator();
    }

    pub(crate) fn hide(&self) {
        let handle = {
            let mut st = self.state.lock();
            st.open = false;
            st.file = None;
            st.token = None;
            st.load_started = None;
            if let Some(timer) = st.retry_timer.take() {
                timer.cancel();
            }
            st.renderer.take()
        };
        teardown(handle);
        self.ui.hide_loading_indicator();
    }
}

fn current_index(state: &SessionState) -> Option<usize> {
    let file = state.file.as_ref()?;
    state.collection.iter().position(|id| *id == file.id)
}

/// Destroy a renderer and stop its event pump. Called outside the state lock
/// so renderer teardown can never dead-lock against the session.
fn teardown(handle: Option<RendererHandle>) {
    if let Some(handle) = handle {
        handle.renderer.destroy();
        handle.pump.abort();
    }
}

/// Fire-and-forget "preview occurred" beacon: a few linear-backoff retries,
/// then silently dropped. Never affects visible session state.
async fn send_preview_beacon(
    api: Arc<dyn MetadataClient>,
    file_id: String,
    token: Option<String>,
    policy: RetryPolicy,
) {
    let body = serde_json::json!({
        "event_type": "preview",
        "source": { "type": "file", "id": file_id },
    });

    let mut attempt = 0u32;
    loop {
        match api.post_event(body.clone(), token.as_deref()).await {
            Ok(()) => return,
            Err(err) => {
                attempt += 1;
                match policy.delay_for(attempt) {
                    Some(delay) => {
                        debug!(
                            "preview beacon failed file_id={} attempt={}: {}",
                            file_id, attempt, err
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        debug!("preview beacon dropped file_id={}", file_id);
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubApi;

    #[async_trait::async_trait]
    impl MetadataClient for StubApi {
        async fn file_info(
            &self,
            _file_id: &str,
            _token: Option<&str>,
        ) -> anyhow::Result<FileDescriptor> {
            Err(anyhow::anyhow!("unused"))
        }

        async fn post_event(
            &self,
            _body: serde_json::Value,
            _token: Option<&str>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubRenderer;

    impl Renderer for StubRenderer {
        fn name(&self) -> &str {
            "stub"
        }

        fn load(&self) {}
    }

    struct CountingFactory(Mutex<u32>);

    impl RendererFactory for CountingFactory {
        fn create(&self, _kind: RendererKind, _context: RendererContext) -> Arc<dyn Renderer> {
            *self.0.lock() += 1;
            Arc::new(StubRenderer)
        }
    }

    #[tokio::test]
    async fn test_load_viewer_skips_superseded_target() {
        let factory = Arc::new(CountingFactory(Mutex::new(0)));
        let session = PreviewSession::new(Arc::new(StubApi), Arc::clone(&factory) as _);
        {
            let mut st = session.inner.state.lock();
            st.open = true;
            st.file = Some(FileDescriptor::bare("f2"));
        }

        // A viewer load for a file the session has already moved past must
        // not touch anything, even though the bare placeholder for the new
        // target would fail the permission check.
        session.inner.load_viewer("f1").unwrap();

        let st = session.inner.state.lock();
        assert!(st.open);
        assert!(st.renderer.is_none());
        assert_eq!(*factory.0.lock(), 0);
    }

    #[tokio::test]
    async fn test_trigger_error_on_closed_session_is_silent() {
        let factory = Arc::new(CountingFactory(Mutex::new(0)));
        let session = PreviewSession::new(Arc::new(StubApi), Arc::clone(&factory) as _);

        let errors = Arc::new(AtomicU32::new(0));
        let errors_seen = Arc::clone(&errors);
        session.events().on(move |event| {
            if matches!(event, SessionEvent::PreviewError { .. }) {
                errors_seen.fetch_add(1, Ordering::Relaxed);
            }
        });
        {
            let mut st = session.inner.state.lock();
            st.open = true;
            st.file = Some(FileDescriptor::bare("f1"));
        }

        session.inner.trigger_error(PreviewError::Renderer("boom".into()));
        session.inner.trigger_error(PreviewError::Renderer("again".into()));

        assert_eq!(errors.load(Ordering::Relaxed), 1);
        assert_eq!(session.counts().error, 1);
        // Only the first failure built an error surface.
        assert_eq!(*factory.0.lock(), 1);
    }

    #[test]
    fn test_accepts_result_guards() {
        let mut state = SessionState::new();
        assert!(!accepts_result(&state, "f1"));

        state.open = true;
        state.file = Some(FileDescriptor::bare("f1"));
        assert!(accepts_result(&state, "f1"));
        assert!(!accepts_result(&state, "f2"));

        state.open = false;
        assert!(!accepts_result(&state, "f1"));
    }

    #[test]
    fn test_current_index_searches_collection() {
        let mut state = SessionState::new();
        state.collection = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(current_index(&state), None);

        state.file = Some(FileDescriptor::bare("b"));
        assert_eq!(current_index(&state), Some(1));

        state.file = Some(FileDescriptor::bare("zz"));
        assert_eq!(current_index(&state), None);
    }
}
