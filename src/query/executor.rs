//! Query submission.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::{QueryEngine, QueryExecution};
use crate::error::Result;

/// Submits queries to the engine without waiting for them.
#[derive(Clone)]
pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Starts `sql` on the engine and returns a `QUEUED` handle.
    ///
    /// Rejections surface as `CdxError::Submission` with the engine's
    /// diagnostic. Nothing is retried here.
    pub async fn submit(&self, sql: &str, output_location: &str) -> Result<QueryExecution> {
        debug!("Submitting query (results to {})", output_location);
        let id = self.engine.start_execution(sql, output_location).await?;
        info!("Started query execution: {}", id);
        Ok(QueryExecution::submitted(id))
    }
}
