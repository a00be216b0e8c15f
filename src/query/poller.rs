//! Completion polling and cost estimation.
//!
//! The poller is the only place the pipeline waits. It samples the engine at
//! a fixed interval until the query is terminal or the wall-clock budget is
//! spent. Abandoning the wait (timeout or cancellation) leaves the remote job
//! running.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{QueryEngine, QueryExecution, QueryState};
use crate::error::{CdxError, Result};

/// Interval between status samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Polling budget before giving up on a query.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(45 * 60);

/// Flat scan price in USD per TiB.
pub const USD_PER_TIB: f64 = 5.0;

const BYTES_PER_TIB: f64 = (1u64 << 40) as f64;
const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Stand-in deadline for budgets too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Estimated scan cost in USD for `data_scanned_bytes`.
pub fn estimate_cost_usd(data_scanned_bytes: u64) -> f64 {
    data_scanned_bytes as f64 / BYTES_PER_TIB * USD_PER_TIB
}

/// Timing knobs for the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// A query that finished successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedQuery {
    /// The terminal execution handle.
    pub execution: QueryExecution,

    /// Time spent waiting, measured from the first sample.
    pub elapsed: Duration,

    /// Advisory scan cost. Never used to make decisions.
    pub cost_estimate_usd: f64,
}

/// Waits for submitted queries to reach a terminal state.
#[derive(Clone)]
pub struct CompletionPoller {
    engine: Arc<dyn QueryEngine>,
    settings: PollSettings,
}

impl CompletionPoller {
    /// Creates a poller with the given timing.
    pub fn new(engine: Arc<dyn QueryEngine>, settings: PollSettings) -> Self {
        Self { engine, settings }
    }

    /// Polls until `execution` succeeds, fails, the budget runs out, or
    /// `cancel` fires.
    pub async fn await_completion(
        &self,
        execution: QueryExecution,
        cancel: &CancellationToken,
    ) -> Result<CompletedQuery> {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.settings.max_wait)
            .unwrap_or_else(|| start + FAR_FUTURE);
        let mut execution = execution;

        loop {
            if Instant::now() >= deadline {
                return Err(self.timed_out(execution.id, start));
            }

            // A status call that outlives the budget is abandoned at the deadline.
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CdxError::Cancelled(execution.id.clone())),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(self.timed_out(execution.id.clone(), start));
                }
                status = self.engine.get_execution_status(&execution.id) => status?,
            };
            execution = execution.observe(status);

            match execution.state {
                QueryState::Succeeded => {
                    let elapsed = start.elapsed();
                    let scanned = execution.data_scanned_bytes.unwrap_or(0);
                    let cost_estimate_usd = estimate_cost_usd(scanned);
                    info!("Query {} completed successfully", execution.id);
                    info!(
                        "Execution time: {:.1}s, data scanned: {:.2} GB, estimated cost: ${:.2}",
                        elapsed.as_secs_f64(),
                        scanned as f64 / BYTES_PER_GIB,
                        cost_estimate_usd
                    );
                    return Ok(CompletedQuery {
                        execution,
                        elapsed,
                        cost_estimate_usd,
                    });
                }
                QueryState::Failed | QueryState::Cancelled => {
                    let reason = execution
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string());
                    warn!("Query {} ended {}: {}", execution.id, execution.state, reason);
                    return Err(CdxError::QueryFailed {
                        execution_id: execution.id,
                        reason,
                    });
                }
                QueryState::Queued | QueryState::Running => {
                    info!(
                        "Query running... ({:.0}s elapsed, status: {})",
                        start.elapsed().as_secs_f64(),
                        execution.state
                    );
                    let wake = Instant::now()
                        .checked_add(self.settings.interval)
                        .map_or(deadline, |t| t.min(deadline));
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(CdxError::Cancelled(execution.id)),
                        _ = tokio::time::sleep_until(wake) => {}
                    }
                }
            }
        }
    }

    fn timed_out(&self, execution_id: String, start: Instant) -> CdxError {
        let waited = start.elapsed();
        warn!(
            "Query {} timed out after {}s; the remote job is left running",
            execution_id,
            waited.as_secs()
        );
        CdxError::Timeout {
            execution_id,
            waited,
        }
    }
}
