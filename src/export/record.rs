//! The exported CDX record and its gzip JSON-lines encoding.

use std::io::{BufRead, BufReader, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{CdxError, Result};

/// `chrono` format of the CDX `timestamp` field (`YYYYMMDDhhmmss`).
pub const CDX_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One exported capture; one per distinct digest.
///
/// All values are strings. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportRecord {
    pub urlkey: String,
    pub timestamp: String,
    pub url: String,
    pub mime: String,
    #[serde(rename = "mime-detected")]
    pub mime_detected: String,
    pub status: String,
    pub digest: String,
    pub length: String,
    pub offset: String,
    pub filename: String,
    pub languages: String,
    pub encoding: String,
}

impl ExportRecord {
    /// Serializes the record as one compact JSON line without a newline.
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CdxError::internal(format!("Failed to serialize record: {e}")))
    }

    /// Parses one exported line.
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| CdxError::storage(format!("Malformed export line: {e}")))
    }
}

/// Encodes records as one gzip member of newline-terminated JSON lines.
pub fn encode_jsonl_gz(records: &[ExportRecord]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for record in records {
        let mut line = record.to_json_line()?;
        line.push('\n');
        encoder
            .write_all(line.as_bytes())
            .map_err(|e| CdxError::internal(format!("gzip write failed: {e}")))?;
    }
    encoder
        .finish()
        .map_err(|e| CdxError::internal(format!("gzip finish failed: {e}")))
}

/// Decodes up to `limit` lines from a gzip text file.
pub fn decode_gz_lines(data: &[u8], limit: usize) -> Result<Vec<String>> {
    BufReader::new(GzDecoder::new(data))
        .lines()
        .take(limit)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| CdxError::storage(format!("Failed to decompress export shard: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(url: &str) -> ExportRecord {
        ExportRecord {
            urlkey: "com,example)/".to_string(),
            timestamp: "20250710123456".to_string(),
            url: url.to_string(),
            mime: "text/html".to_string(),
            mime_detected: "text/html".to_string(),
            status: "200".to_string(),
            digest: "AAAABBBBCCCCDDDD".to_string(),
            length: "1234".to_string(),
            offset: "5678".to_string(),
            filename: "crawl-data/CC-MAIN-2025-30/segments/x.warc.gz".to_string(),
            languages: "eng".to_string(),
            encoding: "UTF-8".to_string(),
        }
    }

    #[test]
    fn test_key_order_and_names() {
        let line = sample("https://example.com/").to_json_line().unwrap();
        let keys = [
            "urlkey",
            "timestamp",
            "url",
            "mime",
            "mime-detected",
            "status",
            "digest",
            "length",
            "offset",
            "filename",
            "languages",
            "encoding",
        ];

        let mut last = 0;
        for key in keys {
            let pos = line.find(&format!("\"{key}\":")).unwrap();
            assert!(pos >= last, "{key} out of order");
            last = pos;
        }
        assert!(line.starts_with('{'));
        assert!(line.ends_with('}'));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_quote_and_newline_round_trip() {
        let url = "https://example.com/a\"b\nc\\d\te";
        let line = sample(url).to_json_line().unwrap();

        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["url"], url);
        assert_eq!(ExportRecord::from_json_line(&line).unwrap().url, url);
    }

    #[test]
    fn test_every_value_is_a_string() {
        let line = sample("https://example.com/").to_json_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 12);
        assert!(object.values().all(|v| v.is_string()));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ExportRecord::from_json_line(r#"{"urlkey":"x","extra":"y"}"#).unwrap_err();
        assert!(matches!(err, CdxError::Storage(_)));
    }

    #[test]
    fn test_gzip_lines() {
        let records = vec![sample("https://a.example/"), sample("https://b.example/")];
        let data = encode_jsonl_gz(&records).unwrap();

        let lines = decode_gz_lines(&data, 10).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(ExportRecord::from_json_line(&lines[1]).unwrap().url, "https://b.example/");

        assert_eq!(decode_gz_lines(&data, 1).unwrap().len(), 1);
    }
}
