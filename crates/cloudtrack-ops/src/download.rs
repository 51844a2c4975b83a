//! Download progress tracking and local materialization.

use std::path::PathBuf;

use cloudtrack_core::{path_string, ChannelEvent, DownloadStatus, Snapshot, TrackError};

use crate::copy::materialize;
use crate::progress::{OperationType, Reaction, StateMachine};

/// Follows one remote file until it is resident, then copies it out.
#[derive(Debug, Clone)]
pub struct DownloadMachine {
    remote: PathBuf,
    local: PathBuf,
}

impl DownloadMachine {
    pub fn new(remote: impl Into<PathBuf>, local: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            local: local.into(),
        }
    }
}

impl StateMachine for DownloadMachine {
    fn operation_type(&self) -> OperationType {
        OperationType::Download
    }

    fn react(&mut self, snapshot: &Snapshot) -> Reaction {
        let Some(record) = snapshot.first() else {
            return Reaction::idle();
        };

        if let Some(message) = &record.download_error {
            let error = TrackError::DownloadFailed {
                path: path_string(&self.remote),
                message: message.clone(),
            };
            return Reaction::finish(vec![error.into()]);
        }

        let mut events = Vec::new();
        if let Some(percent) = record.percent_downloaded {
            events.push(ChannelEvent::Progress(percent));
        }

        if record.download_status != DownloadStatus::Current {
            return Reaction::emit(events);
        }

        match materialize(&self.remote, &self.local) {
            Ok(bytes) => {
                tracing::debug!(
                    remote = %self.remote.display(),
                    local = %self.local.display(),
                    bytes,
                    "download materialized"
                );
                events.push(ChannelEvent::End);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to materialize download");
                events.push(ChannelEvent::from_error(&e));
            }
        }
        Reaction::finish(events)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use cloudtrack_core::{ErrorKind, MetadataRecord};

    use super::*;

    #[test]
    fn test_current_on_first_refresh_copies_and_ends() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("remote.txt");
        let local = dir.path().join("local.txt");
        fs::write(&remote, b"payload").unwrap();
        fs::write(&local, b"stale").unwrap();

        let mut machine = DownloadMachine::new(&remote, &local);
        let record = MetadataRecord::file(path_string(&remote)).resident();
        let reaction = machine.react(&Snapshot::new(vec![record]));

        assert!(reaction.is_terminal());
        assert_eq!(reaction.events(), &[ChannelEvent::End]);
        assert_eq!(fs::read(&local).unwrap(), b"payload");
    }

    #[test]
    fn test_progress_until_current() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("remote.txt");
        let mut machine = DownloadMachine::new(&remote, dir.path().join("local.txt"));

        let reaction = machine.react(&Snapshot::new(vec![
            MetadataRecord::file(path_string(&remote)).downloading(30.0),
        ]));
        assert!(!reaction.is_terminal());
        assert_eq!(reaction.events(), &[ChannelEvent::Progress(30.0)]);
    }

    #[test]
    fn test_local_copy_failure_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("remote.txt");
        fs::write(&remote, b"payload").unwrap();
        let local = dir.path().join("missing-dir").join("local.txt");

        let mut machine = DownloadMachine::new(&remote, &local);
        let reaction = machine.react(&Snapshot::new(vec![
            MetadataRecord::file(path_string(&remote)).resident(),
        ]));

        assert!(reaction.is_terminal());
        assert!(matches!(
            reaction.events(),
            [ChannelEvent::Error {
                kind: ErrorKind::LocalCopyFailed,
                ..
            }]
        ));
    }

    #[test]
    fn test_download_error_terminates() {
        let mut machine = DownloadMachine::new("/cloud/X/a.txt", "/tmp/a.txt");
        let reaction = machine.react(&Snapshot::new(vec![
            MetadataRecord::file("/cloud/X/a.txt").with_download_error("offline"),
        ]));

        assert!(reaction.is_terminal());
        assert!(matches!(
            reaction.events(),
            [ChannelEvent::Error {
                kind: ErrorKind::DownloadFailed,
                ..
            }]
        ));
    }
}
