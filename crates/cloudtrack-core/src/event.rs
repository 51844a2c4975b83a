//! Channel identifiers and the events streamed over them.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, FileInfo, TrackError};

/// Caller-supplied identifier of an event channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(CompactString);

impl ChannelId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(CompactString::new(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Empty ids mean "no channel" at the request boundary.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(CompactString::from(id))
    }
}

/// An event delivered on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Transfer progress in percent (0–100). Not guaranteed monotonic.
    Progress(f64),
    /// The current full file list of a streamed gather.
    FileList(Vec<FileInfo>),
    /// The operation finished; the channel is closed after this.
    End,
    /// The operation failed; the channel is closed after this.
    Error { kind: ErrorKind, message: String },
}

impl ChannelEvent {
    /// Build an error event from a [`TrackError`].
    pub fn from_error(error: &TrackError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// `End` and `Error` terminate a channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error { .. })
    }
}

impl From<TrackError> for ChannelEvent {
    fn from(error: TrackError) -> Self {
        Self::from_error(&error)
    }
}
