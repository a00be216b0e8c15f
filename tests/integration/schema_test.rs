//! Schema manager tests through the full query runner.

use std::sync::Arc;

use cdx_export::engine::MockQueryEngine;
use cdx_export::error::CdxError;
use cdx_export::query::{PollSettings, QueryRunner};
use cdx_export::schema::{ExternalTable, PartitionKey, SchemaManager, ViewDefinition, DOMAINS_TABLE};
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

fn runner(engine: Arc<MockQueryEngine>) -> QueryRunner {
    QueryRunner::new(engine, PollSettings::default(), "s3://b/athena-results/")
}

#[tokio::test]
async fn test_view_over_missing_table_fails() {
    let engine = Arc::new(MockQueryEngine::new());
    let runner = runner(engine);
    let schema = SchemaManager::new(&runner);
    let view = ViewDefinition::normalized_domains("default", DOMAINS_TABLE);

    let err = assert_err!(schema.ensure_normalized_view(&view).await);
    assert!(err.to_string().contains("default.domains_csv"));
}

#[tokio::test]
async fn test_view_replaced_on_each_call() {
    let engine = Arc::new(MockQueryEngine::new().with_domains(["a.com"]));
    let runner = runner(engine.clone());
    let schema = SchemaManager::new(&runner);
    let table = ExternalTable::domains_csv("default", "s3://b/domains/");
    let view = ViewDefinition::normalized_domains("default", DOMAINS_TABLE);

    assert_ok!(schema.ensure_external_table(&table).await);
    assert_ok!(schema.ensure_normalized_view(&view).await);
    assert_ok!(schema.ensure_normalized_view(&view).await);

    assert_eq!(engine.view_names(), vec!["default.domains_norm".to_string()]);
    let creates = engine
        .submitted_sql()
        .iter()
        .filter(|sql| sql.starts_with("CREATE OR REPLACE VIEW"))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn test_partition_on_unknown_table_fails() {
    let engine = Arc::new(MockQueryEngine::new());
    let runner = runner(engine.clone());
    let schema = SchemaManager::new(&runner);
    let table = ExternalTable::cc_index("default");
    let key = PartitionKey::new("CC-MAIN-2025-30", "warc").unwrap();

    let err = assert_err!(schema.add_and_verify_partition(&table, &key).await);

    assert!(matches!(err, CdxError::QueryFailed { .. }));
    assert!(engine.partitions().is_empty());
}

#[tokio::test]
async fn test_partitions_are_tracked_per_key() {
    let engine = Arc::new(MockQueryEngine::new());
    let runner = runner(engine.clone());
    let schema = SchemaManager::new(&runner);
    let table = ExternalTable::cc_index("default");
    let warc = PartitionKey::new("CC-MAIN-2025-30", "warc").unwrap();
    let robots = PartitionKey::new("CC-MAIN-2025-30", "robotstxt").unwrap();

    assert_ok!(schema.ensure_external_table(&table).await);
    assert_ok!(schema.add_and_verify_partition(&table, &warc).await);

    assert!(assert_ok!(schema.verify_partition(&table, &warc).await));
    assert!(!assert_ok!(schema.verify_partition(&table, &robots).await));
}
