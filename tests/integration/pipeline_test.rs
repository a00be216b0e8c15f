//! End-to-end export tests against the in-memory engine and store.

use std::collections::HashSet;
use std::sync::Arc;

use cdx_export::config::Config;
use cdx_export::engine::MockQueryEngine;
use cdx_export::error::CdxError;
use cdx_export::export::{
    count_export_lines, list_export, ExportOrchestrator, ExportRecord, IndexRow, EXPORT_TYPE,
};
use cdx_export::schema::PartitionKey;
use cdx_export::storage::BlobStore;
use pretty_assertions::assert_eq;

use super::common::{at, config, engine_with_store, html_row, CRAWL};

fn partition() -> PartitionKey {
    PartitionKey::new(CRAWL, "warc").unwrap()
}

fn sample_rows() -> Vec<IndexRow> {
    let mut rows = vec![
        // Same digest captured twice: the later capture wins.
        html_row("https://example.com/", "example.com", "D1", at(10, 8)),
        html_row("https://example.com/?ref=1", "example.com", "D1", at(12, 8)),
        // Same digest, same time: the smaller URL wins.
        html_row("https://b.example.com/x", "example.com", "D2", at(11, 0)),
        html_row("https://a.example.com/x", "example.com", "D2", at(11, 0)),
        html_row("https://test.org/page", "test.org", "D3", at(11, 0)),
        // Values that need JSON escaping.
        html_row("https://test.org/q?a=\"b\"\n", "test.org", "D4", at(11, 0)),
    ];

    let mut not_found = html_row("https://example.com/missing", "example.com", "D5", at(11, 0));
    not_found.fetch_status = Some(404);
    let mut pdf = html_row("https://example.com/doc.pdf", "example.com", "D6", at(11, 0));
    pdf.content_mime_detected = Some("application/pdf".to_string());
    let mut no_digest = html_row("https://example.com/nd", "example.com", "D7", at(11, 0));
    no_digest.content_digest = None;
    let other_domain = html_row("https://elsewhere.net/", "elsewhere.net", "D8", at(11, 0));
    let mut other_crawl = html_row("https://example.com/old", "example.com", "D9", at(11, 0));
    other_crawl.crawl = "CC-MAIN-2024-51".to_string();

    rows.extend([not_found, pdf, no_digest, other_domain, other_crawl]);
    rows
}

async fn exported_records(store: &dyn BlobStore, output: &str) -> Vec<ExportRecord> {
    let listing = list_export(store, output).await.unwrap();
    let mut records = Vec::new();
    for file in &listing.files {
        let body = store.get_object(&file.location).await.unwrap();
        for line in cdx_export::export::record::decode_gz_lines(&body, usize::MAX).unwrap() {
            records.push(ExportRecord::from_json_line(&line).unwrap());
        }
    }
    records
}

#[tokio::test]
async fn test_export_keeps_latest_capture_per_digest() {
    let (engine, store) = engine_with_store(&["WWW.Example.com ", "test.org"], sample_rows());
    let orchestrator = ExportOrchestrator::new(engine.clone(), config()).unwrap();

    let outcome = orchestrator.run(&partition()).await.unwrap();

    let output = "s3://test-bucket/results/CC-MAIN-2025-30-cdx-json/";
    assert_eq!(outcome.manifest.output_location, output);
    assert_eq!(outcome.allow_list_size, 2);

    let mut records = exported_records(store.as_ref(), output).await;
    records.sort_by(|a, b| a.digest.cmp(&b.digest));
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/?ref=1",
            "https://a.example.com/x",
            "https://test.org/page",
            "https://test.org/q?a=\"b\"\n",
        ]
    );
    assert_eq!(records[0].timestamp, "20250712080000");
}

#[tokio::test]
async fn test_exported_records_satisfy_filters() {
    let rows = sample_rows();
    let (engine, store) = engine_with_store(&["example.com", "test.org"], rows.clone());
    let outcome = ExportOrchestrator::new(engine, config())
        .unwrap()
        .run(&partition())
        .await
        .unwrap();

    let records = exported_records(store.as_ref(), &outcome.manifest.output_location).await;
    let digests: HashSet<&str> = records.iter().map(|r| r.digest.as_str()).collect();
    assert_eq!(digests.len(), records.len(), "one record per digest");

    for record in &records {
        assert_eq!(record.status, "200");
        assert_eq!(record.mime_detected, "text/html");
        assert!(!record.url.is_empty());
        let source = rows
            .iter()
            .find(|r| r.url.as_deref() == Some(record.url.as_str()))
            .unwrap();
        assert_eq!(source.crawl, CRAWL);
        assert!(
            ["example.com", "test.org"]
                .contains(&source.url_host_registered_domain.as_deref().unwrap())
        );
    }
    assert_eq!(
        count_export_lines(store.as_ref(), &outcome.manifest.output_location)
            .await
            .unwrap(),
        4
    );
}

#[tokio::test]
async fn test_outcome_carries_updated_config() {
    let (engine, _store) = engine_with_store(&["example.com"], sample_rows());
    let input = config();
    let outcome = ExportOrchestrator::new(engine, input.clone())
        .unwrap()
        .run(&partition())
        .await
        .unwrap();

    assert_eq!(outcome.manifest.crawl_id, CRAWL);
    assert_eq!(outcome.manifest.export_type, EXPORT_TYPE);
    assert_eq!(outcome.manifest.execution_id, outcome.query.execution.id);
    assert_eq!(outcome.config.last_export.as_ref(), Some(&outcome.manifest));
    assert_eq!(outcome.config.bucket, input.bucket);
}

#[tokio::test]
async fn test_unwritable_config_does_not_undo_export() {
    let (engine, store) = engine_with_store(&["example.com"], sample_rows());
    let input = config();
    let outcome = ExportOrchestrator::new(engine, input.clone())
        .unwrap()
        .run(&partition())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let unwritable = blocker.join("config.toml");

    let err = input
        .persist_last_export(&unwritable, outcome.manifest.clone())
        .unwrap_err();
    assert!(matches!(err, CdxError::Config(_)), "got {err:?}");
    assert!(!unwritable.exists());

    // The export itself is untouched.
    assert_eq!(
        count_export_lines(store.as_ref(), &outcome.manifest.output_location)
            .await
            .unwrap(),
        2
    );

    let writable = dir.path().join("config.toml");
    input
        .persist_last_export(&writable, outcome.manifest.clone())
        .unwrap();
    let reloaded = Config::load_from_file(&writable).unwrap();
    assert_eq!(reloaded.last_export, Some(outcome.manifest));
}

#[tokio::test]
async fn test_empty_allow_list_fails_before_export() {
    let (engine, store) = engine_with_store(&["  ", ""], sample_rows());

    let err = ExportOrchestrator::new(engine.clone(), config())
        .unwrap()
        .run(&partition())
        .await
        .unwrap_err();

    assert!(matches!(err, CdxError::EmptyInput(_)), "got {err:?}");
    assert!(engine.submitted_sql().iter().all(|sql| !sql.contains("UNLOAD")));
    assert!(engine.partitions().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_partition_aborts_export() {
    let store = Arc::new(cdx_export::storage::MemoryBlobStore::new());
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_domains(["example.com"])
            .with_index_rows(sample_rows())
            .with_store(store.clone())
            .dropping_partitions(),
    );

    let err = ExportOrchestrator::new(engine.clone(), config())
        .unwrap()
        .run(&partition())
        .await
        .unwrap_err();

    match err {
        CdxError::PartitionMissing { crawl_id, subset } => {
            assert_eq!(crawl_id, CRAWL);
            assert_eq!(subset, "warc");
        }
        other => panic!("Expected PartitionMissing, got {other:?}"),
    }
    assert!(engine.submitted_sql().iter().all(|sql| !sql.contains("UNLOAD")));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_submission_error_is_verbatim() {
    let diagnostic = "line 12:7: Column 'cc.content_mime_detected' cannot be resolved";
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_domains(["example.com"])
            .reject_when("UNLOAD", diagnostic),
    );

    let err = ExportOrchestrator::new(engine, config())
        .unwrap()
        .run(&partition())
        .await
        .unwrap_err();

    match err {
        CdxError::Submission(msg) => assert_eq!(msg, diagnostic),
        other => panic!("Expected Submission, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_export_query_carries_reason() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_domains(["example.com"])
            .fail_when("UNLOAD", "HIVE_CURSOR_ERROR: corrupt file"),
    );

    let err = ExportOrchestrator::new(engine, config())
        .unwrap()
        .run(&partition())
        .await
        .unwrap_err();

    match err {
        CdxError::QueryFailed { reason, .. } => assert_eq!(reason, "HIVE_CURSOR_ERROR: corrupt file"),
        other => panic!("Expected QueryFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rerun_into_same_prefix_is_refused() {
    let (engine, store) = engine_with_store(&["example.com"], sample_rows());
    let orchestrator = ExportOrchestrator::new(engine.clone(), config()).unwrap();

    orchestrator.run(&partition()).await.unwrap();
    let err = orchestrator.run(&partition()).await.unwrap_err();

    assert!(matches!(err, CdxError::QueryFailed { .. }), "got {err:?}");
    assert!(err.to_string().contains("HIVE_PATH_ALREADY_EXISTS"));
    assert_eq!(store.len(), 1);
    // Schema steps stayed idempotent across both runs.
    assert_eq!(engine.partitions(), vec![partition()]);
    assert_eq!(
        engine.table_names(),
        vec!["default.ccindex".to_string(), "default.domains_csv".to_string()]
    );
}

#[tokio::test]
async fn test_distinct_subsets_use_distinct_prefixes() {
    let mut robots = html_row("https://example.com/robots.txt", "example.com", "R1", at(11, 0));
    robots.subset = "robotstxt".to_string();
    let mut rows = sample_rows();
    rows.push(robots);
    let (engine, store) = engine_with_store(&["example.com"], rows);
    let orchestrator = ExportOrchestrator::new(engine, config()).unwrap();

    let warc = orchestrator.run(&partition()).await.unwrap();
    let robots = orchestrator
        .run(&PartitionKey::new(CRAWL, "robotstxt").unwrap())
        .await
        .unwrap();

    assert_ne!(warc.manifest.output_location, robots.manifest.output_location);
    let robots_records = exported_records(store.as_ref(), &robots.manifest.output_location).await;
    assert_eq!(robots_records.len(), 1);
    assert_eq!(robots_records[0].digest, "R1");
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut bad = config();
    bad.results_location = "results/".to_string();

    let result = ExportOrchestrator::new(Arc::new(MockQueryEngine::new()), bad);
    assert!(matches!(result, Err(CdxError::Config(_))));
}
