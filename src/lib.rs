// Preview engine — session orchestration for client-side content previews.
//
// A `PreviewSession` drives one file at a time through token resolution,
// metadata fetch, viewer selection, and rendering, with a metadata cache,
// linear retry on fetch failure, and background prefetch of neighboring
// collection entries.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod file;
pub mod registry;
pub mod renderer;
pub mod session;
pub mod tokens;
pub mod ui;

pub use api::{HttpMetadataClient, MetadataClient};
pub use cache::{FileTier, MetadataCache, PersistentTier};
pub use config::PreviewOptions;
pub use error::PreviewError;
pub use events::{EventBus, SessionEvent, SubscriptionId};
pub use file::{FileDescriptor, Permission, Permissions, Representation};
pub use registry::{Loader, RendererKind, ViewerCapability, ViewerRegistry};
pub use renderer::{PrefetchTargets, Renderer, RendererContext, RendererEvent, RendererFactory};
pub use session::{PrefetchRequest, PreviewSession, RetryPolicy, SessionCounts};
pub use tokens::{CredentialSource, TokenResolverFn, TokenResponse};
pub use ui::{NoopUi, UiShell};
