//! Allow-list upload and inspection of export output.

use tracing::{debug, info};

use super::dedup::{parse_allow_list_csv, AllowList};
use super::record::decode_gz_lines;
use crate::config::Config;
use crate::error::{CdxError, Result};
use crate::storage::{BlobStore, ObjectInfo, S3Location};

/// Where an allow-list went and how many domains it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedAllowList {
    pub location: S3Location,
    pub raw_count: usize,
    pub normalized_count: usize,
}

/// Checks `csv` and stores it as `file_name` under the domains prefix.
///
/// A file without any non-empty domain is rejected before anything is written.
pub async fn upload_allow_list(
    store: &dyn BlobStore,
    config: &Config,
    file_name: &str,
    csv: &str,
) -> Result<UploadedAllowList> {
    let raw = parse_allow_list_csv(csv);
    let normalized_count = AllowList::from_raw(&raw).len();
    if normalized_count == 0 {
        return Err(CdxError::empty_input(format!(
            "{file_name} has no domains below its header line"
        )));
    }

    let location = S3Location::parse(&config.domains_prefix())?.join(file_name);
    store.put_object(&location, csv.as_bytes().to_vec()).await?;
    info!("Uploaded {} domains to {}", raw.len(), location);

    Ok(UploadedAllowList {
        location,
        raw_count: raw.len(),
        normalized_count,
    })
}

/// Files of one export, sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportListing {
    pub prefix: S3Location,
    pub files: Vec<ObjectInfo>,
}

impl ExportListing {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// First gzip shard, if any.
    pub fn first_shard(&self) -> Option<&ObjectInfo> {
        self.files
            .iter()
            .find(|f| f.location.file_name().ends_with(".gz"))
    }
}

/// Lists the files under an export's output prefix.
pub async fn list_export(store: &dyn BlobStore, output_location: &str) -> Result<ExportListing> {
    let prefix = S3Location::parse(output_location)?.as_prefix();
    let mut files = store.list_objects(&prefix).await?;
    files.retain(|f| !f.location.key.ends_with('/'));
    files.sort_by(|a, b| a.location.key.cmp(&b.location.key));
    debug!("{} files under {}", files.len(), prefix);
    Ok(ExportListing { prefix, files })
}

/// Reads the first `lines` lines of the export's first shard.
pub async fn preview_export(
    store: &dyn BlobStore,
    output_location: &str,
    lines: usize,
) -> Result<Vec<String>> {
    let listing = list_export(store, output_location).await?;
    let shard = listing.first_shard().ok_or_else(|| {
        CdxError::storage(format!("No .gz files under {}", listing.prefix))
    })?;
    let body = store.get_object(&shard.location).await?;
    decode_gz_lines(&body, lines)
}

/// Counts lines across every shard of an export.
pub async fn count_export_lines(store: &dyn BlobStore, output_location: &str) -> Result<usize> {
    let listing = list_export(store, output_location).await?;
    let mut total = 0;
    for file in listing.files.iter().filter(|f| f.location.key.ends_with(".gz")) {
        let body = store.get_object(&file.location).await?;
        total += decode_gz_lines(&body, usize::MAX)?.len();
    }
    Ok(total)
}
