//! # iris-table-engine
//!
//! Query construction, pagination and metadata engine for browsing and
//! editing tables of a remote SQL-capable server that exposes only a generic
//! "run this SQL with these bound parameters" HTTP endpoint — no native
//! driver, no OFFSET/LIMIT, no cursor protocol (InterSystems IRIS-style).
//!
//! ## Features
//!
//! - Safe, parameterized SQL generation: every user-typed value travels as a
//!   bound parameter, every dynamic identifier passes a single validation
//!   choke point
//! - Windowed pagination over a TOP-only dialect via the `%VID` row-ordinal
//! - Wildcard filtering (`*` / `?`), single-column sorting
//! - Catalog-backed schema discovery (namespaces, tables, columns)
//! - Cell update, row insert/delete, and chunked full-table export with
//!   type-aware value conversion
//!
//! ## What this crate is not
//!
//! The engine is stateless and side-effect-free apart from the network calls
//! it issues. It performs no HTTP itself (the [`Transport`] trait is
//! injected), keeps no cache, holds no connection or transaction, and does no
//! retries — retry policy belongs to the caller, because insert and delete
//! are not safely idempotent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iris_table_engine::{
//!     EngineConfig, FilterCriterion, MetadataService, PageRequest, QueryExecutor, SortSpec,
//!     TableReference, Transport,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn browse<T: Transport>(transport: Arc<T>) -> iris_table_engine::Result<()> {
//!     let config = EngineConfig::default();
//!     let metadata = MetadataService::new(transport.clone(), config.clone());
//!     let executor = QueryExecutor::new(transport, "USER", config);
//!
//!     let cancel = CancellationToken::new();
//!     let table = TableReference::parse("HR.Employees")?;
//!     let schema = metadata.table_schema("USER", &table, &cancel).await?;
//!
//!     let page = executor
//!         .fetch_page(
//!             &schema,
//!             PageRequest::new(50, 0)?,
//!             &[FilterCriterion { column: "Name".into(), pattern: "Sm*h".into() }],
//!             &SortSpec::none(),
//!             &cancel,
//!         )
//!         .await?;
//!     println!("{} of {} rows", page.rows.len(), page.total_matching_row_count);
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod executor;
pub mod export;
pub mod metadata;
pub mod schema;
pub mod sql;
pub mod transport;

// Public exports
pub use config::EngineConfig;
pub use executor::QueryExecutor;
pub use export::{convert_for_export, ExportBatch, ExportStream, ExportValue, TypeCategory};
pub use metadata::MetadataService;
pub use schema::{
    ColumnDescriptor, FilterCriterion, PageRequest, QueryResult, QuerySpec, ResultRow,
    SortDirection, SortSpec, TableReference, TableSchema,
};
pub use transport::Transport;

use thiserror::Error;

/// Error taxonomy for every engine operation
///
/// Validation failures (`InvalidIdentifier`, `InvalidInput`) are raised
/// before any network call; they never reach the transport. Everything else
/// maps a transport-level outcome so the UI layer can render
/// context-specific messages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A table, schema or column name failed identifier validation.
    /// Caller bug or stale UI state; retrying the same request cannot help.
    #[error("invalid {role}: {name:?}")]
    InvalidIdentifier { role: String, name: String },

    /// Malformed call, e.g. mismatched column/value list lengths
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Remote server rejected the credentials (HTTP 401/403).
    /// Recoverable by re-authenticating.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Remote server answered with an unexpected HTTP status
    #[error("server returned HTTP status {status}")]
    TransportFailed { status: u16 },

    /// Network-level failure before any HTTP status was received.
    /// Recoverable by retry, at the caller's discretion.
    #[error("server unreachable: {0}")]
    ServerUnreachable(String),

    /// The per-round-trip timeout budget elapsed
    #[error("request timed out")]
    TimedOut,

    /// The caller cancelled the operation; not a failure to surface as one
    #[error("cancelled")]
    Cancelled,

    /// The remote server executed the request but reported a SQL-level
    /// failure (constraint violation, type error, ...). Message passed
    /// through; recoverable by correcting the input.
    #[error("remote query failed: {0}")]
    RemoteQueryError(String),
}

impl EngineError {
    /// Map an HTTP response status to the matching variant
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => EngineError::AuthenticationFailed,
            other => EngineError::TransportFailed { status: other },
        }
    }

    /// True for caller cancellation and timeouts, which a UI should not
    /// render as failure toasts
    pub fn is_interruption(&self) -> bool {
        matches!(self, EngineError::Cancelled | EngineError::TimedOut)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
