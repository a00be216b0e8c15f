//! Completion polling under paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use cdx_export::engine::{MockQueryEngine, QueryEngine, QueryExecution};
use cdx_export::error::CdxError;
use cdx_export::query::{CompletionPoller, PollSettings, QueryRunner};
use tokio_test::{assert_pending, assert_ready_err};
use tokio_util::sync::CancellationToken;

fn settings(interval_secs: u64, max_wait_secs: u64) -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(interval_secs),
        max_wait: Duration::from_secs(max_wait_secs),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_budget() {
    let engine = Arc::new(MockQueryEngine::new().never_completing());
    let id = engine.start_execution("SELECT 1", "s3://b/r/").await.unwrap();
    let poller = CompletionPoller::new(engine.clone(), settings(10, 60));

    let err = poller
        .await_completion(QueryExecution::submitted(id.clone()), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CdxError::Timeout {
            execution_id,
            waited,
        } => {
            assert_eq!(execution_id, id);
            assert_eq!(waited, Duration::from_secs(60));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    // Samples at 0, 10, 20, 30, 40 and 50 seconds.
    assert_eq!(engine.status_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_runner_timeout_stops_pipeline() {
    let engine = Arc::new(MockQueryEngine::new().never_completing());
    let runner = QueryRunner::new(engine.clone(), settings(30, 90), "s3://b/r/");

    let err = runner.execute("SELECT 1").await.unwrap_err();

    assert!(matches!(err, CdxError::Timeout { .. }));
    assert_eq!(engine.submitted_sql().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completion_within_budget() {
    let engine = Arc::new(MockQueryEngine::new().with_pending_polls(5));
    let runner = QueryRunner::new(engine.clone(), settings(10, 60), "s3://b/r/");

    let completed = runner.execute("SELECT 1").await.unwrap();

    assert_eq!(completed.elapsed, Duration::from_secs(50));
    assert_eq!(engine.status_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_wakes_sleeping_poller() {
    let engine = Arc::new(MockQueryEngine::new().never_completing());
    let id = engine.start_execution("SELECT 1", "s3://b/r/").await.unwrap();
    let poller = CompletionPoller::new(engine.clone(), settings(30, 2700));
    let cancel = CancellationToken::new();

    let mut task = tokio_test::task::spawn(
        poller.await_completion(QueryExecution::submitted(id), &cancel),
    );
    assert_pending!(task.poll());
    assert_eq!(engine.status_calls(), 1);

    cancel.cancel();
    assert!(task.is_woken());
    let err = assert_ready_err!(task.poll());
    assert!(matches!(err, CdxError::Cancelled(_)));
    assert_eq!(engine.status_calls(), 1);
}
