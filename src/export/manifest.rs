//! Provenance of the last successful export.

use serde::{Deserialize, Serialize};

/// Export type tag recorded in every manifest.
pub const EXPORT_TYPE: &str = "cdx_unique_200_latest_html";

/// Which crawl was exported, where it went, and by which query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub crawl_id: String,
    pub output_location: String,
    pub export_type: String,
    pub execution_id: String,
}

impl ExportManifest {
    pub fn new(
        crawl_id: impl Into<String>,
        output_location: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            crawl_id: crawl_id.into(),
            output_location: output_location.into(),
            export_type: EXPORT_TYPE.to_string(),
            execution_id: execution_id.into(),
        }
    }
}
