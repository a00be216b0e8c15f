//! In-process ranked dedup over index rows.
//!
//! Mirrors the export query row for row: same allow-list normalization, same
//! filters, same ranking. The in-memory engine uses it to materialize
//! exports, and tests use it to check the dedup and filter invariants.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::record::{ExportRecord, CDX_TIMESTAMP_FORMAT};
use crate::schema::PartitionKey;

/// Only captures with this status are exported.
pub const EXPORT_STATUS: u16 = 200;

/// Only captures with this detected MIME type are exported.
pub const EXPORT_MIME: &str = "text/html";

/// One row of the URL index, with its partition columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub crawl: String,
    pub subset: String,
    pub url_surtkey: Option<String>,
    pub url: Option<String>,
    pub url_host_registered_domain: Option<String>,
    pub fetch_time: NaiveDateTime,
    pub fetch_status: Option<u16>,
    pub content_digest: Option<String>,
    pub content_mime_type: Option<String>,
    pub content_mime_detected: Option<String>,
    pub content_charset: Option<String>,
    pub content_languages: Option<String>,
    pub warc_filename: Option<String>,
    pub warc_record_offset: Option<i64>,
    pub warc_record_length: Option<i64>,
}

/// Normalizes an allow-list entry: trim, lowercase, drop one leading `www.`.
///
/// Blank entries are dropped.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    Some(lower.strip_prefix("www.").unwrap_or(&lower).to_string())
}

/// The set of normalized allow-list domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    domains: HashSet<String>,
}

impl AllowList {
    /// Builds the list from raw entries, normalizing and deduplicating them.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: raw
                .into_iter()
                .filter_map(|d| normalize_domain(d.as_ref()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Exact match against a registered domain as stored in the index.
    pub fn contains(&self, registered_domain: &str) -> bool {
        self.domains.contains(registered_domain)
    }
}

/// Reads the `domain` column of an allow-list CSV, skipping the header line.
pub fn parse_allow_list_csv(text: &str) -> Vec<String> {
    text.lines()
        .skip(1)
        .map(first_csv_field)
        .filter(|d| !d.trim().is_empty())
        .collect()
}

/// First field of a CSV line, as OpenCSVSerde reads it: `"` quotes and `\`
/// escapes the next character in quoted and unquoted fields alike.
fn first_csv_field(line: &str) -> String {
    let line = line.trim_end_matches('\r');
    let quoted = line.starts_with('"');
    let mut chars = line.chars().skip(usize::from(quoted)).peekable();
    let mut field = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    field.push(escaped);
                }
            }
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' if quoted => break,
            ',' if !quoted => break,
            _ => field.push(c),
        }
    }
    field
}

/// Whether a row survives the export filters and the allow-list join.
pub fn passes_filter(row: &IndexRow, allow_list: &AllowList) -> bool {
    row.fetch_status == Some(EXPORT_STATUS)
        && row.content_mime_detected.as_deref() == Some(EXPORT_MIME)
        && row.content_digest.is_some()
        && row.url.is_some()
        && row
            .url_host_registered_domain
            .as_deref()
            .is_some_and(|d| allow_list.contains(d))
}

fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Rank order within a digest group: newest fetch first, then URL, WARC
/// filename and WARC offset ascending.
pub fn rank_order(a: &IndexRow, b: &IndexRow) -> Ordering {
    b.fetch_time
        .cmp(&a.fetch_time)
        .then_with(|| nulls_last(&a.url, &b.url))
        .then_with(|| nulls_last(&a.warc_filename, &b.warc_filename))
        .then_with(|| nulls_last(&a.warc_record_offset, &b.warc_record_offset))
}

/// Keeps the rank-1 row of every digest group, ordered by digest.
///
/// Rows without a digest are dropped.
pub fn latest_per_digest<'a, I>(rows: I) -> Vec<&'a IndexRow>
where
    I: IntoIterator<Item = &'a IndexRow>,
{
    let mut best: BTreeMap<&str, &IndexRow> = BTreeMap::new();
    for row in rows {
        let Some(digest) = row.content_digest.as_deref() else {
            continue;
        };
        best.entry(digest)
            .and_modify(|current| {
                if rank_order(row, current) == Ordering::Less {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    best.into_values().collect()
}

impl From<&IndexRow> for ExportRecord {
    fn from(row: &IndexRow) -> Self {
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }
        fn number<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(T::to_string).unwrap_or_default()
        }

        Self {
            urlkey: text(&row.url_surtkey),
            timestamp: row.fetch_time.format(CDX_TIMESTAMP_FORMAT).to_string(),
            url: text(&row.url),
            mime: text(&row.content_mime_type),
            mime_detected: text(&row.content_mime_detected),
            status: number(&row.fetch_status),
            digest: text(&row.content_digest),
            length: number(&row.warc_record_length),
            offset: number(&row.warc_record_offset),
            filename: text(&row.warc_filename),
            languages: text(&row.content_languages),
            encoding: text(&row.content_charset),
        }
    }
}

/// Runs the whole protocol over one partition: filter, join, rank, keep rank 1.
pub fn export_records(
    rows: &[IndexRow],
    allow_list: &AllowList,
    partition: &PartitionKey,
) -> Vec<ExportRecord> {
    let candidates = rows.iter().filter(|row| {
        row.crawl == partition.crawl_id
            && row.subset == partition.subset
            && passes_filter(row, allow_list)
    });
    latest_per_digest(candidates)
        .into_iter()
        .map(ExportRecord::from)
        .collect()
}
