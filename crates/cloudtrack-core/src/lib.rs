//! Core types for cloudtrack.
//!
//! This crate provides the data model shared by the operation engine and its
//! hosts: remote metadata records, the file info reported to callers, channel
//! events, the error taxonomy, and configuration.

mod config;
mod error;
mod event;
mod query;
mod record;

pub use config::{TrackerConfig, TrackerConfigBuilder, UploadCompletion};
pub use error::{ConfigError, ErrorKind, TrackError};
pub use event::{ChannelEvent, ChannelId};
pub use query::{path_string, MetadataQuery, PathPredicate, SearchScope};
pub use record::{DownloadStatus, FileInfo, MetadataRecord, Snapshot, PATH_SEPARATOR};
