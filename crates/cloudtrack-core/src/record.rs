//! Remote metadata records and the file info derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used in record paths, regardless of platform.
pub const PATH_SEPARATOR: char = '/';

/// Whether the local copy of a remote item is resident and current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    /// Only metadata is present locally.
    #[default]
    NotDownloaded,
    /// An older version is resident, or the download is in progress.
    Downloading,
    /// The resident copy matches the remote one.
    Current,
}

/// One remote item as observed in a single refresh of a watch.
///
/// Records are never mutated in place once published; every refresh of the
/// provider produces a fresh [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// Absolute path of the item with `/` separators. Directories end with a
    /// trailing separator.
    pub path: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Creation time, if known.
    pub created: Option<DateTime<Utc>>,
    /// Last content change, if known.
    pub content_changed: Option<DateTime<Utc>>,
    /// Conflicting versions exist that nobody resolved yet.
    pub has_unresolved_conflicts: bool,
    pub download_status: DownloadStatus,
    pub is_downloading: bool,
    pub is_uploaded: bool,
    pub is_uploading: bool,
    /// Upload progress in percent (0–100).
    pub percent_uploaded: Option<f64>,
    /// Download progress in percent (0–100).
    pub percent_downloaded: Option<f64>,
    pub upload_error: Option<String>,
    pub download_error: Option<String>,
}

impl MetadataRecord {
    /// Create a record for a file at `path`.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a record for a directory at `path`, appending the trailing
    /// separator if missing.
    pub fn directory(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with(PATH_SEPARATOR) {
            path.push(PATH_SEPARATOR);
        }
        Self {
            path,
            ..Default::default()
        }
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the creation and content change times.
    pub fn with_times(
        mut self,
        created: Option<DateTime<Utc>>,
        content_changed: Option<DateTime<Utc>>,
    ) -> Self {
        self.created = created;
        self.content_changed = content_changed;
        self
    }

    /// Mark the item as uploading with the given percentage.
    pub fn uploading(mut self, percent: f64) -> Self {
        self.is_uploading = true;
        self.percent_uploaded = Some(percent);
        self
    }

    /// Mark the item as downloading with the given percentage.
    pub fn downloading(mut self, percent: f64) -> Self {
        self.is_downloading = true;
        self.download_status = DownloadStatus::Downloading;
        self.percent_downloaded = Some(percent);
        self
    }

    /// Mark the item as fully uploaded and resident.
    pub fn resident(mut self) -> Self {
        self.is_uploaded = true;
        self.is_uploading = false;
        self.is_downloading = false;
        self.download_status = DownloadStatus::Current;
        self
    }

    /// Set the download status.
    pub fn with_download_status(mut self, status: DownloadStatus) -> Self {
        self.download_status = status;
        self
    }

    /// Attach an upload error.
    pub fn with_upload_error(mut self, message: impl Into<String>) -> Self {
        self.upload_error = Some(message.into());
        self
    }

    /// Attach a download error.
    pub fn with_download_error(mut self, message: impl Into<String>) -> Self {
        self.download_error = Some(message.into());
        self
    }

    /// Whether the record denotes a directory.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with(PATH_SEPARATOR)
    }
}

/// The full set of records matching a watch as of one refresh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    records: Vec<MetadataRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    /// First record, used by single-file watches.
    pub fn first(&self) -> Option<&MetadataRecord> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// An empty snapshot means "not yet observable", not "absent".
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records that are not directories.
    pub fn files(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.iter().filter(|r| !r.is_directory())
    }
}

impl From<Vec<MetadataRecord>> for Snapshot {
    fn from(records: Vec<MetadataRecord>) -> Self {
        Self::new(records)
    }
}

/// File entry reported by listing operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Path relative to the container root.
    pub relative_path: String,
    pub size_in_bytes: Option<u64>,
    pub creation_epoch_seconds: Option<f64>,
    pub content_change_epoch_seconds: Option<f64>,
    pub has_unresolved_conflicts: bool,
    pub download_status: DownloadStatus,
    pub is_downloading: bool,
    pub is_uploaded: bool,
    pub is_uploading: bool,
}

impl FileInfo {
    /// Build a file entry from a record, relative to `container_root`.
    ///
    /// Returns `None` for directory records.
    pub fn from_record(record: &MetadataRecord, container_root: &str) -> Option<Self> {
        if record.is_directory() {
            return None;
        }

        Some(Self {
            relative_path: relative_to(&record.path, container_root),
            size_in_bytes: record.size,
            creation_epoch_seconds: record.created.map(epoch_seconds),
            content_change_epoch_seconds: record.content_changed.map(epoch_seconds),
            has_unresolved_conflicts: record.has_unresolved_conflicts,
            download_status: record.download_status,
            is_downloading: record.is_downloading,
            is_uploaded: record.is_uploaded,
            is_uploading: record.is_uploading,
        })
    }
}

/// Strip the container prefix from a record path.
fn relative_to(path: &str, container_root: &str) -> String {
    let root = container_root.trim_end_matches(PATH_SEPARATOR);
    match path.strip_prefix(root) {
        Some(rest) if rest.is_empty() || rest.starts_with(PATH_SEPARATOR) => {
            rest.trim_start_matches(PATH_SEPARATOR).to_string()
        }
        _ => path.trim_start_matches(PATH_SEPARATOR).to_string(),
    }
}

fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1_000_000_000.0
}
