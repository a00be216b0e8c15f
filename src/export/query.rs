//! The ranked-dedup UNLOAD statement.
//!
//! Each string value is rendered through `json_format(CAST(… AS JSON))`, so
//! quotes, backslashes, newlines and every other control character come out
//! escaped and each output line is a standalone JSON object.

use crate::schema::{quote_literal, ExternalTable, PartitionKey, ViewDefinition};

use super::dedup::{EXPORT_MIME, EXPORT_STATUS};

/// Builds the export statement for one partition.
#[derive(Debug, Clone)]
pub struct ExportQuery<'a> {
    pub index: &'a ExternalTable,
    pub domains: &'a ViewDefinition,
    pub partition: &'a PartitionKey,
    pub output_prefix: &'a str,
}

/// `(json key, ranked column)` in output order.
const FIELDS: [(&str, &str); 12] = [
    ("urlkey", "urlkey"),
    ("timestamp", "\"timestamp\""),
    ("url", "url"),
    ("mime", "mime"),
    ("mime-detected", "mime_detected"),
    ("status", "status"),
    ("digest", "digest"),
    ("length", "length"),
    ("offset", "\"offset\""),
    ("filename", "filename"),
    ("languages", "languages"),
    ("encoding", "encoding"),
];

/// A JSON string literal for `expr`, with NULL rendered as `""`.
pub fn json_string_expr(expr: &str) -> String {
    format!("json_format(CAST(COALESCE({expr}, '') AS JSON))")
}

impl ExportQuery<'_> {
    /// The `CONCAT(…)` expression producing one JSON object per row.
    fn record_expr(&self) -> String {
        let mut parts = Vec::with_capacity(FIELDS.len() * 2 + 1);
        for (i, (key, column)) in FIELDS.iter().enumerate() {
            let open = if i == 0 { "{" } else { "," };
            parts.push(quote_literal(&format!("{open}\"{key}\":")));
            parts.push(json_string_expr(column));
        }
        parts.push(quote_literal("}"));
        format!("CONCAT(\n      {}\n    )", parts.join(",\n      "))
    }

    /// Full `UNLOAD … TO … WITH (format='TEXTFILE', compression='GZIP')` text.
    pub fn to_sql(&self) -> String {
        let index = self.index.qualified_name();
        let domains = self.domains.qualified_name();
        let crawl = quote_literal(&self.partition.crawl_id);
        let subset = quote_literal(&self.partition.subset);
        let mime = quote_literal(EXPORT_MIME);
        let record = self.record_expr();
        let target = quote_literal(self.output_prefix);

        format!(
            r#"UNLOAD (
  WITH ranked AS (
    SELECT
      cc.url_surtkey                                 AS urlkey,
      date_format(cc.fetch_time, '%Y%m%d%H%i%s')     AS "timestamp",
      cc.url                                         AS url,
      cc.content_mime_type                           AS mime,
      cc.content_mime_detected                       AS mime_detected,
      CAST(cc.fetch_status AS VARCHAR)               AS status,
      cc.content_digest                              AS digest,
      CAST(cc.warc_record_length AS VARCHAR)         AS length,
      CAST(cc.warc_record_offset AS VARCHAR)         AS "offset",
      cc.warc_filename                               AS filename,
      cc.content_languages                           AS languages,
      cc.content_charset                             AS encoding,
      ROW_NUMBER() OVER (
        PARTITION BY cc.content_digest
        ORDER BY cc.fetch_time DESC, cc.url ASC, cc.warc_filename ASC, cc.warc_record_offset ASC
      ) AS rn
    FROM {index} cc
    JOIN {domains} d
      ON cc.url_host_registered_domain = d.domain_norm
    WHERE cc.crawl = {crawl}
      AND cc.subset = {subset}
      AND cc.fetch_status = {EXPORT_STATUS}
      AND cc.content_mime_detected = {mime}
      AND cc.content_digest IS NOT NULL
      AND cc.url IS NOT NULL
  )
  SELECT
    {record} AS cdx_record
  FROM ranked
  WHERE rn = 1
)
TO {target}
WITH (
  format = 'TEXTFILE',
  compression = 'GZIP'
)"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DOMAINS_TABLE;

    fn sql() -> String {
        let index = ExternalTable::cc_index("default");
        let domains = ViewDefinition::normalized_domains("default", DOMAINS_TABLE);
        let partition = PartitionKey::new("CC-MAIN-2025-30", "warc").unwrap();
        ExportQuery {
            index: &index,
            domains: &domains,
            partition: &partition,
            output_prefix: "s3://b/results/CC-MAIN-2025-30-cdx-json/",
        }
        .to_sql()
    }

    #[test]
    fn test_filters_and_join() {
        let sql = sql();
        assert!(sql.starts_with("UNLOAD ("));
        assert!(sql.contains("FROM default.ccindex cc"));
        assert!(sql.contains("JOIN default.domains_norm d"));
        assert!(sql.contains("ON cc.url_host_registered_domain = d.domain_norm"));
        assert!(sql.contains("WHERE cc.crawl = 'CC-MAIN-2025-30'"));
        assert!(sql.contains("AND cc.subset = 'warc'"));
        assert!(sql.contains("AND cc.fetch_status = 200"));
        assert!(sql.contains("AND cc.content_mime_detected = 'text/html'"));
        assert!(sql.contains("AND cc.content_digest IS NOT NULL"));
        assert!(sql.contains("AND cc.url IS NOT NULL"));
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let sql = sql();
        assert!(sql.contains("PARTITION BY cc.content_digest"));
        assert!(sql.contains(
            "ORDER BY cc.fetch_time DESC, cc.url ASC, cc.warc_filename ASC, cc.warc_record_offset ASC"
        ));
        assert!(sql.contains("WHERE rn = 1"));
    }

    #[test]
    fn test_output_target_and_format() {
        let sql = sql();
        assert!(sql.contains("TO 's3://b/results/CC-MAIN-2025-30-cdx-json/'"));
        assert!(sql.contains("format = 'TEXTFILE'"));
        assert!(sql.contains("compression = 'GZIP'"));
    }

    #[test]
    fn test_every_field_is_json_escaped() {
        let sql = sql();
        for (key, column) in FIELDS {
            assert!(sql.contains(&format!("\"{key}\":'")), "missing key {key}");
            assert!(sql.contains(&json_string_expr(column)), "unescaped {column}");
        }
        assert!(sql.contains("'{\"urlkey\":'"));
        assert!(sql.contains("'}'"));
        assert_eq!(sql.matches("json_format(").count(), 12);
    }
}
