//! SQL text for tables, views and partitions.
//!
//! Every statement built here is idempotent: tables use `IF NOT EXISTS`,
//! views use `CREATE OR REPLACE`, partitions use `ADD IF NOT EXISTS`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CdxError, Result};

/// Public location of the Common Crawl columnar URL index.
pub const CC_INDEX_LOCATION: &str = "s3://commoncrawl/cc-index/table/cc-main/warc/";

/// Table holding the raw domain allow-list.
pub const DOMAINS_TABLE: &str = "domains_csv";

/// View exposing normalized allow-list domains as `domain_norm`.
pub const DOMAINS_VIEW: &str = "domains_norm";

/// Table over the Common Crawl URL index.
pub const INDEX_TABLE: &str = "ccindex";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn partition_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"))
}

/// Checks that `name` can be spliced into SQL as a bare identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CdxError::config(format!("Invalid SQL identifier '{name}'")))
    }
}

/// Quotes a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes a single character for Hive SERDEPROPERTIES, where backslash escapes.
fn serde_char_literal(c: char) -> String {
    match c {
        '\\' | '\'' => format!("'\\{c}'"),
        _ => format!("'{c}'"),
    }
}

/// Identifies one slice of the index by crawl and subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub crawl_id: String,
    pub subset: String,
}

impl PartitionKey {
    /// Creates a key, rejecting values that cannot appear in a storage path.
    pub fn new(crawl_id: impl Into<String>, subset: impl Into<String>) -> Result<Self> {
        let key = Self {
            crawl_id: crawl_id.into(),
            subset: subset.into(),
        };
        for value in [&key.crawl_id, &key.subset] {
            if !partition_value_pattern().is_match(value) {
                return Err(CdxError::config(format!("Invalid partition value '{value}'")));
            }
        }
        Ok(key)
    }

    /// The partition's directory under a table location.
    pub fn location(&self, table_location: &str) -> String {
        format!(
            "{}/crawl={}/subset={}/",
            table_location.trim_end_matches('/'),
            self.crawl_id,
            self.subset
        )
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crawl={}, subset={}", self.crawl_id, self.subset)
    }
}

/// How an external table's files are laid out.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageFormat {
    /// Delimited text read through OpenCSVSerde.
    Csv {
        separator: char,
        quote: char,
        escape: char,
        skip_header_lines: u32,
    },
    Parquet,
}

/// A named column with its engine type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// An external table over files in blob storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTable {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partitioned_by: Vec<ColumnDef>,
    pub format: StorageFormat,
    pub location: String,
}

impl ExternalTable {
    /// The single-column allow-list CSV with a header line.
    pub fn domains_csv(database: &str, location: &str) -> Self {
        Self {
            database: database.to_string(),
            name: DOMAINS_TABLE.to_string(),
            columns: vec![ColumnDef::new("domain", "STRING")],
            partitioned_by: vec![],
            format: StorageFormat::Csv {
                separator: ',',
                quote: '"',
                escape: '\\',
                skip_header_lines: 1,
            },
            location: location.to_string(),
        }
    }

    /// The Common Crawl URL index, partitioned by crawl and subset.
    pub fn cc_index(database: &str) -> Self {
        let columns = [
            ("url_surtkey", "STRING"),
            ("url", "STRING"),
            ("url_host_name", "STRING"),
            ("url_host_registered_domain", "STRING"),
            ("url_protocol", "STRING"),
            ("url_port", "INT"),
            ("url_path", "STRING"),
            ("url_query", "STRING"),
            ("fetch_time", "TIMESTAMP"),
            ("fetch_status", "SMALLINT"),
            ("content_digest", "STRING"),
            ("content_mime_type", "STRING"),
            ("content_mime_detected", "STRING"),
            ("content_charset", "STRING"),
            ("content_languages", "STRING"),
            ("warc_filename", "STRING"),
            ("warc_record_offset", "INT"),
            ("warc_record_length", "INT"),
            ("warc_segment", "STRING"),
        ]
        .into_iter()
        .map(|(name, ty)| ColumnDef::new(name, ty))
        .collect();

        Self {
            database: database.to_string(),
            name: INDEX_TABLE.to_string(),
            columns,
            partitioned_by: vec![
                ColumnDef::new("crawl", "STRING"),
                ColumnDef::new("subset", "STRING"),
            ],
            format: StorageFormat::Parquet,
            location: CC_INDEX_LOCATION.to_string(),
        }
    }

    /// `database.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// `CREATE EXTERNAL TABLE IF NOT EXISTS` for this table.
    pub fn create_sql(&self) -> String {
        let columns = render_columns(&self.columns);
        let mut sql = format!(
            "CREATE EXTERNAL TABLE IF NOT EXISTS {} (\n{}\n)\n",
            self.qualified_name(),
            columns
        );

        if !self.partitioned_by.is_empty() {
            let parts: Vec<String> = self
                .partitioned_by
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            sql.push_str(&format!("PARTITIONED BY ({})\n", parts.join(", ")));
        }

        match &self.format {
            StorageFormat::Csv {
                separator,
                quote,
                escape,
                skip_header_lines,
            } => {
                sql.push_str("ROW FORMAT SERDE 'org.apache.hadoop.hive.serde2.OpenCSVSerde'\n");
                sql.push_str(&format!(
                    "WITH SERDEPROPERTIES (\n  'separatorChar' = {},\n  'quoteChar'     = {},\n  'escapeChar'    = {}\n)\n",
                    serde_char_literal(*separator),
                    serde_char_literal(*quote),
                    serde_char_literal(*escape)
                ));
                sql.push_str(&format!("LOCATION {}\n", quote_literal(&self.location)));
                if *skip_header_lines > 0 {
                    sql.push_str(&format!(
                        "TBLPROPERTIES ('skip.header.line.count'='{skip_header_lines}')"
                    ));
                }
            }
            StorageFormat::Parquet => {
                sql.push_str("STORED AS PARQUET\n");
                sql.push_str(&format!("LOCATION {}", quote_literal(&self.location)));
            }
        }

        sql.trim_end().to_string()
    }

    /// `ALTER TABLE … ADD IF NOT EXISTS PARTITION` for one crawl/subset.
    pub fn add_partition_sql(&self, key: &PartitionKey, location: &str) -> String {
        format!(
            "ALTER TABLE {}\nADD IF NOT EXISTS PARTITION (crawl={}, subset={})\nLOCATION {}",
            self.qualified_name(),
            quote_literal(&key.crawl_id),
            quote_literal(&key.subset),
            quote_literal(location)
        )
    }

    /// Count of matching rows in the partition metadata table. Scans no data.
    pub fn partition_count_sql(&self, key: &PartitionKey) -> String {
        format!(
            "SELECT COUNT(1) AS cnt\nFROM \"{}\".\"{}$partitions\"\nWHERE crawl={} AND subset={}",
            self.database,
            self.name,
            quote_literal(&key.crawl_id),
            quote_literal(&key.subset)
        )
    }
}

fn render_columns(columns: &[ColumnDef]) -> String {
    let width = columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    columns
        .iter()
        .map(|c| format!("  {:width$} {}", c.name, c.data_type, width = width))
        .collect::<Vec<_>>()
        .join(",\n")
}

/// A view whose definition is replaced on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub database: String,
    pub name: String,
    pub select_sql: String,
}

impl ViewDefinition {
    /// Distinct allow-list domains, trimmed, lowercased, with a leading `www.` removed.
    pub fn normalized_domains(database: &str, source_table: &str) -> Self {
        Self {
            database: database.to_string(),
            name: DOMAINS_VIEW.to_string(),
            select_sql: format!(
                "SELECT DISTINCT\n  REGEXP_REPLACE(LOWER(TRIM(domain)), '^www\\.', '') AS domain_norm\nFROM {database}.{source_table}\nWHERE domain IS NOT NULL AND TRIM(domain) <> ''"
            ),
        }
    }

    /// `database.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// `CREATE OR REPLACE VIEW` for this view.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE OR REPLACE VIEW {} AS\n{}",
            self.qualified_name(),
            self.select_sql
        )
    }

    /// Row count of the view.
    pub fn count_sql(&self) -> String {
        format!(
            "SELECT CAST(COUNT(*) AS BIGINT) AS cnt FROM {}",
            self.qualified_name()
        )
    }
}
