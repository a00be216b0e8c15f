//! Result reading for small, bounded result sets.
//!
//! Exports never pass through here; the engine writes them straight to
//! storage.

use std::sync::Arc;

use crate::engine::{QueryEngine, QueryExecution, QueryState, ResultSet};
use crate::error::{CdxError, Result};

/// Reads column-labelled rows of a finished query.
#[derive(Clone)]
pub struct ResultReader {
    engine: Arc<dyn QueryEngine>,
}

impl ResultReader {
    /// Creates a new result reader.
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Fetches at most `max_rows` data rows of a `SUCCEEDED` execution.
    pub async fn fetch_results(
        &self,
        execution: &QueryExecution,
        max_rows: usize,
    ) -> Result<ResultSet> {
        if execution.state != QueryState::Succeeded {
            return Err(CdxError::invalid_state(format!(
                "cannot read results of query {} in state {}",
                execution.id, execution.state
            )));
        }

        // One extra row for the header the engine prepends.
        let page = self
            .engine
            .get_results(&execution.id, max_rows.saturating_add(1))
            .await?;
        let mut results = ResultSet::from_page(page)?;
        results.rows.truncate(max_rows);
        Ok(results)
    }
}
