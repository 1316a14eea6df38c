use crate::registry::Loader;

/// Number of upcoming collection entries to prefetch after a successful render.
pub const PREFETCH_COUNT: usize = 4;

/// Maximum metadata fetch attempts for one file before the session gives up.
pub const FETCH_RETRY_LIMIT: u32 = 5;

/// Base delay for linear metadata fetch backoff (delay = base * attempt).
pub const FETCH_RETRY_BASE_MS: u64 = 500;

/// Maximum retries for the fire-and-forget preview beacon.
pub const BEACON_RETRY_LIMIT: u32 = 3;

/// Base delay for linear beacon backoff.
pub const BEACON_RETRY_BASE_MS: u64 = 500;

/// Viewer capabilities disabled unless a caller re-enables them.
pub const DEFAULT_DISABLED_VIEWERS: &[&str] = &["office"];

/// Caller-supplied options for one `show()` call.
#[derive(Clone, Default)]
pub struct PreviewOptions {
    /// Ordered collection of file ids to browse; the shown file's index is
    /// derived by searching this list.
    pub collection: Vec<String>,
    /// Loaders tried before the built-in ones, in order.
    pub loaders: Vec<Loader>,
    /// Viewer capability names to disable in addition to the defaults.
    pub disabled_viewers: Vec<String>,
    /// Skip network revalidation, the preview beacon, and prefetch. Requires
    /// valid cached metadata to render anything.
    pub skip_server_update: bool,
    /// Suppress the "preview occurred" beacon without affecting anything else.
    pub disable_event_log: bool,
}

impl std::fmt::Debug for PreviewOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewOptions")
            .field("collection", &self.collection)
            .field("loaders", &self.loaders.len())
            .field("disabled_viewers", &self.disabled_viewers)
            .field("skip_server_update", &self.skip_server_update)
            .field("disable_event_log", &self.disable_event_log)
            .finish()
    }
}
