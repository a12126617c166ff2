//! Transport client seam
//!
//! The engine never performs an HTTP call itself: it produces a
//! [`QuerySpec`](crate::schema::QuerySpec) and hands it to an injected
//! [`Transport`] implementation. Endpoint, credentials and connection
//! lifecycle live inside that implementation; the engine only relies on the
//! contract below.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::schema::{QuerySpec, ResultRow};
use crate::{EngineError, Result};

/// Client for the remote server's SQL-over-HTTP endpoint
///
/// Contract the engine relies on:
/// - `execute` preserves column names and row order from the remote result
///   set
/// - errors distinguish authentication failure, transport failure and
///   remote-reported SQL error text via the [`EngineError`] variants
/// - statements that return no result set (INSERT/UPDATE/DELETE) yield an
///   empty row list on success
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Run one parameterized statement in the given namespace
    async fn execute(
        &self,
        namespace: &str,
        query: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResultRow>>;

    /// Query the server's root/self-describe endpoint for its namespace list
    async fn list_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<String>>;
}

/// Run one round trip under the caller's cancellation token and the
/// per-round-trip timeout budget
///
/// Caller cancellation and budget exhaustion map to distinct variants so the
/// UI can render different messages.
pub(crate) async fn round_trip<T: Transport + ?Sized>(
    transport: &T,
    namespace: &str,
    query: &QuerySpec,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Vec<ResultRow>> {
    debug!(
        sql = %query.sql_text,
        parameter_count = query.parameters.len(),
        namespace,
        "executing remote query"
    );

    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        outcome = tokio::time::timeout(timeout, transport.execute(namespace, query, cancel)) => {
            match outcome {
                Err(_) => Err(EngineError::TimedOut),
                Ok(result) => result,
            }
        }
    }
}

/// Same wrapper for the namespace self-describe call
pub(crate) async fn round_trip_namespaces<T: Transport + ?Sized>(
    transport: &T,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Vec<String>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        outcome = tokio::time::timeout(timeout, transport.list_namespaces(cancel)) => {
            match outcome {
                Err(_) => Err(EngineError::TimedOut),
                Ok(result) => result,
            }
        }
    }
}
