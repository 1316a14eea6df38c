// Session orchestration — lifecycle state machine, retry policy, prefetch.

pub mod controller;
pub mod prefetch;
pub mod retry;

pub use controller::PreviewSession;
pub use prefetch::PrefetchRequest;
pub use retry::RetryPolicy;

/// Counters carried across loads within one session handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub success: u32,
    pub error: u32,
    pub navigation: u32,
}
