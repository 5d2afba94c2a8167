//! Loader: reads the raw observation table from the store.

use crate::model::{PipelineError, Table};
use crate::store::Store;

/// Executes `query` verbatim and returns the fully materialized result.
///
/// No retries: a rejected query is a `Query` error, a dropped connection
/// a `Connection` error, and either aborts the run.
pub fn load<S: Store + ?Sized>(store: &mut S, query: &str) -> Result<Table, PipelineError> {
    if query.trim().is_empty() {
        return Err(PipelineError::Query("query is empty".to_string()));
    }
    store.query(query)
}
