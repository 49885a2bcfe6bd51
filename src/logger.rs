use crate::{Error, Projection, ResolvedQuery, StatementKind, project};

/// Receives trace events of statement building and execution.
///
/// Handed explicitly to [`crate::QueryBuilder`] and [`crate::SqlSession`]; every hook has an
/// empty default.
#[allow(unused_variables)]
pub trait QueryLogger: Send + Sync {
    /// Whether row projections should be built for [`QueryLogger::rows_fetched`].
    fn debug_enabled(&self) -> bool {
        false
    }

    fn statement_loaded(&self, mapper: &str, kind: StatementKind, id: &str) {}

    fn query_resolved(&self, query: &ResolvedQuery) {}

    /// `rows` is only built when [`QueryLogger::debug_enabled`] is `true`.
    fn rows_fetched(&self, count: usize, rows: Option<&Projection>) {}

    fn failed(&self, error: &Error) {}
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl QueryLogger for TracingLogger {
    fn debug_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }

    fn statement_loaded(&self, mapper: &str, kind: StatementKind, id: &str) {
        tracing::debug!(mapper, %kind, id, "loaded sql mapper statement");
    }

    fn query_resolved(&self, query: &ResolvedQuery) {
        tracing::debug!(sql = query.sql(), params = %project(query.args()), "parsed sql");
    }

    fn rows_fetched(&self, count: usize, rows: Option<&Projection>) {
        match rows {
            Some(Projection::List(items)) if items.len() > 1 => {
                tracing::debug!(count, "result rows");
                for (i, row) in items.iter().enumerate() {
                    tracing::debug!(row = i + 1, "{row}");
                }
            }
            Some(rows) => tracing::debug!(count, %rows, "result rows"),
            None => tracing::debug!(count, "result rows"),
        }
    }

    fn failed(&self, error: &Error) {
        tracing::error!(%error, "sql mapper statement failed");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl QueryLogger for NoopLogger {}
