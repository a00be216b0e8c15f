//! Shared fixtures for integration tests.

use std::sync::Arc;

use cdx_export::config::Config;
use cdx_export::engine::MockQueryEngine;
use cdx_export::export::IndexRow;
use cdx_export::storage::MemoryBlobStore;
use chrono::{NaiveDate, NaiveDateTime};

pub const CRAWL: &str = "CC-MAIN-2025-30";

pub fn config() -> Config {
    Config::for_bucket("test-bucket", "us-east-1")
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// A row that passes every export filter.
pub fn html_row(url: &str, domain: &str, digest: &str, fetched: NaiveDateTime) -> IndexRow {
    IndexRow {
        crawl: CRAWL.to_string(),
        subset: "warc".to_string(),
        url_surtkey: Some(format!("{})/", domain.split('.').rev().collect::<Vec<_>>().join(","))),
        url: Some(url.to_string()),
        url_host_registered_domain: Some(domain.to_string()),
        fetch_time: fetched,
        fetch_status: Some(200),
        content_digest: Some(digest.to_string()),
        content_mime_type: Some("text/html".to_string()),
        content_mime_detected: Some("text/html".to_string()),
        content_charset: Some("UTF-8".to_string()),
        content_languages: Some("eng".to_string()),
        warc_filename: Some("crawl-data/CC-MAIN-2025-30/segments/1/warc/a.warc.gz".to_string()),
        warc_record_offset: Some(1024),
        warc_record_length: Some(4096),
    }
}

/// An engine over `rows` and `domains` that writes into a fresh store.
pub fn engine_with_store(
    domains: &[&str],
    rows: Vec<IndexRow>,
) -> (Arc<MockQueryEngine>, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    let engine = MockQueryEngine::new()
        .with_domains(domains.iter().copied())
        .with_index_rows(rows)
        .with_store(store.clone());
    (Arc::new(engine), store)
}
