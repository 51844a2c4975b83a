//! Request and response types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cloudtrack_core::{ChannelId, FileInfo, TrackError};

/// A request routed by the [`crate::Dispatcher`].
///
/// The JSON form is tagged by `method`, with camelCase field names:
///
/// ```json
/// {"method": "upload", "containerId": "X", "localPath": "/tmp/a.txt",
///  "remoteName": "a.txt", "channelId": "up-1"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Set the session default container.
    Initialize { container_id: String },
    /// Register a channel ahead of the operation that will drive it.
    CreateChannel { channel_id: String },
    /// The external subscriber of a channel went away.
    CancelChannel { channel_id: String },
    /// List the files of a container.
    Gather {
        container_id: Option<String>,
        channel_id: Option<String>,
    },
    /// Copy a local file into a container.
    Upload {
        container_id: Option<String>,
        local_path: PathBuf,
        remote_name: String,
        channel_id: Option<String>,
    },
    /// Materialize a remote file and copy it to a local path.
    Download {
        container_id: Option<String>,
        remote_name: String,
        local_path: PathBuf,
        channel_id: Option<String>,
    },
    /// Remove a file from a container.
    Delete {
        container_id: Option<String>,
        remote_name: String,
    },
    /// Move a file inside a container.
    Move {
        container_id: Option<String>,
        from_relative_path: String,
        to_relative_path: String,
    },
}

impl Operation {
    /// Parse a JSON request. Malformed input is an argument error.
    pub fn from_json(json: &str) -> Result<Self, TrackError> {
        let operation: Self = serde_json::from_str(json)
            .map_err(|e| TrackError::argument(format!("malformed request: {e}")))?;
        operation.validate()?;
        Ok(operation)
    }

    /// Check that every required field is present and non-empty.
    pub fn validate(&self) -> Result<(), TrackError> {
        match self {
            Self::Initialize { container_id } => require("containerId", container_id),
            Self::CreateChannel { channel_id } | Self::CancelChannel { channel_id } => {
                require("channelId", channel_id)
            }
            Self::Gather { .. } => Ok(()),
            Self::Upload {
                local_path,
                remote_name,
                ..
            }
            | Self::Download {
                local_path,
                remote_name,
                ..
            } => {
                if local_path.as_os_str().is_empty() {
                    return Err(TrackError::argument("localPath is required"));
                }
                require("remoteName", remote_name)
            }
            Self::Delete { remote_name, .. } => require("remoteName", remote_name),
            Self::Move {
                from_relative_path,
                to_relative_path,
                ..
            } => {
                require("fromRelativePath", from_relative_path)?;
                require("toRelativePath", to_relative_path)
            }
        }
    }

    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::CreateChannel { .. } => "createChannel",
            Self::CancelChannel { .. } => "cancelChannel",
            Self::Gather { .. } => "gather",
            Self::Upload { .. } => "upload",
            Self::Download { .. } => "download",
            Self::Delete { .. } => "delete",
            Self::Move { .. } => "move",
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), TrackError> {
    if value.is_empty() {
        Err(TrackError::argument(format!("{field} is required")))
    } else {
        Ok(())
    }
}

/// Interpret an optional channel id; the empty string means "no channel".
pub fn channel_of(channel_id: Option<&str>) -> Option<ChannelId> {
    channel_id.filter(|id| !id.is_empty()).map(ChannelId::new)
}

/// Result of a successfully dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// One-shot file list of a gather without a channel.
    Files(Vec<FileInfo>),
    /// Everything else.
    Ack,
}

impl Response {
    pub fn files(&self) -> Option<&[FileInfo]> {
        match self {
            Self::Files(files) => Some(files),
            Self::Ack => None,
        }
    }
}
