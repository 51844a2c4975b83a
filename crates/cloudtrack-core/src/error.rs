//! Error types for tracked operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ChannelId;

/// Classification of a [`TrackError`] as seen by external callers.
///
/// Every native failure (filesystem or provider) shares the `E_NAT` wire code
/// but keeps its own kind, so a failed local copy is never confused with a
/// failed remote download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Missing or malformed request fields.
    Argument,
    /// The container root could not be resolved.
    ContainerUnavailable,
    /// The target of a delete does not exist.
    FileNotFound,
    /// A channel with the same id is already registered or bound.
    DuplicateChannel,
    /// Copying a local file into the container, or materializing a
    /// downloaded file locally, failed.
    LocalCopyFailed,
    /// The provider refused to start materializing a remote item.
    TriggerFailed,
    /// Removing a file from the container failed.
    DeleteFailed,
    /// Moving a file inside the container failed.
    MoveFailed,
    /// The provider reported an upload error.
    UploadFailed,
    /// The provider reported a download error.
    DownloadFailed,
    /// Any other provider failure.
    Provider,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Argument => "E_ARG",
            Self::ContainerUnavailable => "E_CTR",
            Self::FileNotFound => "E_FNF",
            Self::DuplicateChannel => "E_DUP",
            _ => "E_NAT",
        }
    }

    /// Whether this kind wraps a failure surfaced by the provider or the
    /// local filesystem.
    pub fn is_native(&self) -> bool {
        self.code() == "E_NAT"
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument => write!(f, "Invalid arguments"),
            Self::ContainerUnavailable => write!(f, "Container unavailable"),
            Self::FileNotFound => write!(f, "File not found"),
            Self::DuplicateChannel => write!(f, "Duplicate channel"),
            Self::LocalCopyFailed => write!(f, "Local copy failed"),
            Self::TriggerFailed => write!(f, "Download trigger failed"),
            Self::DeleteFailed => write!(f, "Delete failed"),
            Self::MoveFailed => write!(f, "Move failed"),
            Self::UploadFailed => write!(f, "Upload failed"),
            Self::DownloadFailed => write!(f, "Download failed"),
            Self::Provider => write!(f, "Provider error"),
        }
    }
}

/// Errors that can occur while handling a request or a watch refresh.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Missing or malformed request fields.
    #[error("Invalid arguments: {message}")]
    Argument { message: String },

    /// Channel is not registered.
    #[error("Unknown channel: {channel}")]
    UnknownChannel { channel: ChannelId },

    /// Container id could not be resolved to a root directory.
    #[error(
        "Container unavailable: {container_id} ({reason}). Check the container id, \
         that the user is signed in, and that storage permission is granted"
    )]
    ContainerUnavailable { container_id: String, reason: String },

    /// Target path does not exist.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Channel already registered, or already bound to a running watch.
    #[error("Channel already exists: {channel}")]
    DuplicateChannel { channel: ChannelId },

    /// A local copy (into the container, or out of it) failed.
    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    LocalCopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The provider refused to begin materializing a remote item.
    #[error("Failed to start downloading {}: {message}", path.display())]
    TriggerFailed { path: PathBuf, message: String },

    /// Removing a file failed.
    #[error("Failed to delete {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving a file failed.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The provider reported an upload error for a tracked file.
    #[error("Upload of {path} failed: {message}")]
    UploadFailed { path: String, message: String },

    /// The provider reported a download error for a tracked file.
    #[error("Download of {path} failed: {message}")]
    DownloadFailed { path: String, message: String },

    /// Other provider error.
    #[error("{message}")]
    Provider { message: String },
}

impl TrackError {
    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    /// Create a container error.
    pub fn container(container_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerUnavailable {
            container_id: container_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a delete error, classifying a missing target as
    /// [`TrackError::FileNotFound`].
    pub fn delete(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound { path },
            _ => Self::DeleteFailed { path, source },
        }
    }

    /// The external classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument { .. } | Self::UnknownChannel { .. } => ErrorKind::Argument,
            Self::ContainerUnavailable { .. } => ErrorKind::ContainerUnavailable,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::DuplicateChannel { .. } => ErrorKind::DuplicateChannel,
            Self::LocalCopyFailed { .. } => ErrorKind::LocalCopyFailed,
            Self::TriggerFailed { .. } => ErrorKind::TriggerFailed,
            Self::DeleteFailed { .. } => ErrorKind::DeleteFailed,
            Self::MoveFailed { .. } => ErrorKind::MoveFailed,
            Self::UploadFailed { .. } => ErrorKind::UploadFailed,
            Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::Provider { .. } => ErrorKind::Provider,
        }
    }

    /// Stable wire code, e.g. `E_ARG` or `E_NAT`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::TrackerConfig`].
    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
