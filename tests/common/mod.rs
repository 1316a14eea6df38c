#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use preview_engine::{
    FileDescriptor, MetadataClient, Permissions, PrefetchTargets, PreviewSession, Renderer,
    RendererContext, RendererEvent, RendererFactory, RendererKind, Representation, SessionEvent,
};

/// Previewable pdf descriptor with one matching representation.
pub fn pdf_file(id: &str, version: &str) -> FileDescriptor {
    FileDescriptor {
        id: id.into(),
        extension: "pdf".into(),
        version: version.into(),
        permissions: Some(Permissions {
            can_preview: true,
            can_download: false,
            can_annotate: false,
        }),
        watermarked: false,
        representations: vec![Representation::new("pdf", "https://cdn.test/{+asset}")],
    }
}

/// In-memory metadata backend with scriptable failures and gates.
#[derive(Default)]
pub struct MockApi {
    pub files: Mutex<HashMap<String, FileDescriptor>>,
    /// Ids whose file_info always fails.
    pub fail_info: Mutex<HashSet<String>>,
    /// Ids whose file_info fails the first N times, then succeeds.
    pub fail_info_times: Mutex<HashMap<String, u32>>,
    /// Ids whose file_info parks until the gate is notified.
    pub gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub info_calls: Mutex<Vec<(String, Option<String>)>>,
    pub posted: Mutex<Vec<serde_json::Value>>,
    pub fail_post: Mutex<bool>,
    pub post_attempts: Mutex<u32>,
}

impl MockApi {
    pub fn with_files(files: Vec<FileDescriptor>) -> Arc<Self> {
        let api = Self::default();
        {
            let mut map = api.files.lock();
            for file in files {
                map.insert(file.id.clone(), file);
            }
        }
        Arc::new(api)
    }

    pub fn info_count(&self) -> usize {
        self.info_calls.lock().len()
    }

    pub fn info_count_for(&self, file_id: &str) -> usize {
        self.info_calls
            .lock()
            .iter()
            .filter(|(id, _)| id == file_id)
            .count()
    }

    pub fn gate(&self, file_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(file_id.to_string(), Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl MetadataClient for MockApi {
    async fn file_info(&self, file_id: &str, token: Option<&str>) -> Result<FileDescriptor> {
        self.info_calls
            .lock()
            .push((file_id.to_string(), token.map(str::to_string)));

        let gate = self.gates.lock().get(file_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        {
            let mut budgets = self.fail_info_times.lock();
            if let Some(remaining) = budgets.get_mut(file_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("injected failure: {}", file_id));
                }
            }
        }
        if self.fail_info.lock().contains(file_id) {
            return Err(anyhow!("injected failure: {}", file_id));
        }

        self.files
            .lock()
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow!("file info failed: HTTP 404"))
    }

    async fn post_event(&self, body: serde_json::Value, _token: Option<&str>) -> Result<()> {
        *self.post_attempts.lock() += 1;
        if *self.fail_post.lock() {
            return Err(anyhow!("event post failed: HTTP 500"));
        }
        self.posted.lock().push(body);
        Ok(())
    }
}

/// Renderer double that records everything and, unless the factory is in
/// manual mode, reports a finished (or failed) load immediately.
pub struct MockRenderer {
    pub kind: RendererKind,
    pub file_id: String,
    pub error_message: Option<String>,
    pub prefetches: Mutex<Vec<PrefetchTargets>>,
    pub loads: Mutex<u32>,
    pub destroyed: Mutex<bool>,
    events: mpsc::UnboundedSender<RendererEvent>,
    complete_on_load: bool,
    fail_message: Option<String>,
}

impl Renderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    fn load(&self) {
        *self.loads.lock() += 1;
        if self.complete_on_load {
            let _ = self.events.send(RendererEvent::Load {
                error: self.fail_message.clone(),
            });
        }
    }

    fn prefetch(&self, targets: PrefetchTargets) {
        self.prefetches.lock().push(targets);
    }

    fn destroy(&self) {
        *self.destroyed.lock() = true;
    }
}

#[derive(Default)]
pub struct MockFactory {
    pub created: Mutex<Vec<Arc<MockRenderer>>>,
    /// When set, every non-error renderer reports this load failure.
    pub fail_message: Mutex<Option<String>>,
    /// When true, renderers never report load completion on their own.
    pub manual: Mutex<bool>,
}

impl MockFactory {
    pub fn created_for(&self, file_id: &str) -> Vec<Arc<MockRenderer>> {
        self.created
            .lock()
            .iter()
            .filter(|r| r.file_id == file_id)
            .cloned()
            .collect()
    }

    pub fn error_surfaces(&self) -> Vec<Arc<MockRenderer>> {
        self.created
            .lock()
            .iter()
            .filter(|r| r.kind == RendererKind::Error)
            .cloned()
            .collect()
    }

    pub fn render_count(&self) -> usize {
        self.created
            .lock()
            .iter()
            .filter(|r| r.kind != RendererKind::Error)
            .count()
    }
}

impl RendererFactory for MockFactory {
    fn create(&self, kind: RendererKind, context: RendererContext) -> Arc<dyn Renderer> {
        let is_error_surface = kind == RendererKind::Error;
        let renderer = Arc::new(MockRenderer {
            kind,
            file_id: context.file.id.clone(),
            error_message: context.error_message.clone(),
            prefetches: Mutex::new(Vec::new()),
            loads: Mutex::new(0),
            destroyed: Mutex::new(false),
            events: context.events.clone(),
            complete_on_load: !is_error_surface && !*self.manual.lock(),
            fail_message: if is_error_surface {
                None
            } else {
                self.fail_message.lock().clone()
            },
        });
        self.created.lock().push(Arc::clone(&renderer));
        renderer
    }
}

pub fn session(api: &Arc<MockApi>, factory: &Arc<MockFactory>) -> PreviewSession {
    PreviewSession::new(
        Arc::clone(api) as Arc<dyn MetadataClient>,
        Arc::clone(factory) as Arc<dyn RendererFactory>,
    )
}

/// Bridge the session bus into a channel the test can await on.
pub fn event_channel(session: &PreviewSession) -> mpsc::UnboundedReceiver<SessionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.events().on(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

pub async fn expect_event(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn expect_load(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    expect_event(rx, |e| matches!(e, SessionEvent::Load { .. })).await
}

pub async fn expect_error_code(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    expected: &str,
) -> SessionEvent {
    expect_event(rx, |e| {
        matches!(e, SessionEvent::PreviewError { code, .. } if *code == expected)
    })
    .await
}

/// Poll a condition until it holds; sleeps auto-advance under a paused clock.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Give spawned tasks a chance to settle, then return.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
