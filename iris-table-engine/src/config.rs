//! Engine configuration
//!
//! All tunables are carried explicitly per engine instance rather than as
//! module-level state, so tests can run with mocked catalogs and short
//! timeouts side by side.

use std::time::Duration;

/// Default budget for one HTTP round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on rows per page, matching what a grid can usefully render
pub const DEFAULT_MAX_PAGE_SIZE_ROWS: u64 = 500;

/// Configuration shared by the metadata service and query executor
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied per individual round trip, not per logical operation;
    /// a multi-chunk export gets this budget for every chunk
    pub request_timeout: Duration,

    /// Page sizes above this are clamped before SQL is built
    pub max_page_size_rows: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_page_size_rows: DEFAULT_MAX_PAGE_SIZE_ROWS,
        }
    }
}
