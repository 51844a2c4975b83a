//! Upload progress tracking.

use cloudtrack_core::{ChannelEvent, Snapshot, TrackError, UploadCompletion};

use crate::progress::{OperationType, Reaction, StateMachine};

/// Follows one file the sync agent is pushing to the remote.
///
/// The local copy into the container happens before the watch starts; this
/// machine only reports what the provider says about the copy afterwards.
#[derive(Debug, Clone)]
pub struct UploadMachine {
    remote_path: String,
    completion: UploadCompletion,
    complete_percent: f64,
    seen_uploading: bool,
}

impl UploadMachine {
    pub fn new(
        remote_path: impl Into<String>,
        completion: UploadCompletion,
        complete_percent: f64,
    ) -> Self {
        Self {
            remote_path: remote_path.into(),
            completion,
            complete_percent,
            seen_uploading: false,
        }
    }

    fn percent_done(&self, percent: Option<f64>) -> bool {
        percent.is_some_and(|p| p >= self.complete_percent)
    }
}

impl StateMachine for UploadMachine {
    fn operation_type(&self) -> OperationType {
        OperationType::Upload
    }

    fn react(&mut self, snapshot: &Snapshot) -> Reaction {
        let Some(record) = snapshot.first() else {
            return Reaction::idle();
        };

        if let Some(message) = &record.upload_error {
            let error = TrackError::UploadFailed {
                path: self.remote_path.clone(),
                message: message.clone(),
            };
            return Reaction::finish(vec![error.into()]);
        }

        let mut events = Vec::new();
        if let Some(percent) = record.percent_uploaded {
            events.push(ChannelEvent::Progress(percent));
        }

        // An item that was never seen uploading and is not uploaded yet has
        // simply not been picked up by the sync agent.
        let idle = !record.is_uploading && (self.seen_uploading || record.is_uploaded);
        self.seen_uploading |= record.is_uploading;

        let done = match self.completion {
            UploadCompletion::Percent => self.percent_done(record.percent_uploaded),
            UploadCompletion::IdleFlag => idle,
            UploadCompletion::Either => self.percent_done(record.percent_uploaded) || idle,
        };

        if done {
            events.push(ChannelEvent::End);
            Reaction::finish(events)
        } else {
            Reaction::emit(events)
        }
    }
}

#[cfg(test)]
mod tests {
    use cloudtrack_core::{ErrorKind, MetadataRecord};

    use super::*;

    const PATH: &str = "/cloud/X/a.txt";

    fn refresh(record: MetadataRecord) -> Snapshot {
        Snapshot::new(vec![record])
    }

    #[test]
    fn test_percent_sequence_ends_at_hundred() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::Either, 100.0);

        let mut seen = Vec::new();
        for percent in [10.0, 55.0, 100.0] {
            let reaction = machine.react(&refresh(MetadataRecord::file(PATH).uploading(percent)));
            let terminal = reaction.is_terminal();
            seen.extend(reaction.into_parts().0);
            if terminal {
                break;
            }
        }

        assert_eq!(
            seen,
            vec![
                ChannelEvent::Progress(10.0),
                ChannelEvent::Progress(55.0),
                ChannelEvent::Progress(100.0),
                ChannelEvent::End,
            ]
        );
    }

    #[test]
    fn test_empty_snapshot_is_not_absence() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::Either, 100.0);
        assert_eq!(machine.react(&Snapshot::default()), Reaction::idle());
    }

    #[test]
    fn test_upload_error_terminates() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::Either, 100.0);
        let reaction = machine.react(&refresh(
            MetadataRecord::file(PATH).uploading(40.0).with_upload_error("quota"),
        ));

        assert!(reaction.is_terminal());
        match reaction.events() {
            [ChannelEvent::Error { kind, message }] => {
                assert_eq!(*kind, ErrorKind::UploadFailed);
                assert!(message.contains("quota"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_idle_flag_completion() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::IdleFlag, 100.0);

        // Not yet picked up by the sync agent.
        assert!(!machine.react(&refresh(MetadataRecord::file(PATH))).is_terminal());
        // Reaching the percentage alone does not count under this rule.
        assert!(
            !machine
                .react(&refresh(MetadataRecord::file(PATH).uploading(100.0)))
                .is_terminal()
        );

        let mut done = MetadataRecord::file(PATH);
        done.percent_uploaded = Some(100.0);
        let reaction = machine.react(&refresh(done));
        assert!(reaction.is_terminal());
        assert_eq!(reaction.events().last(), Some(&ChannelEvent::End));
    }

    #[test]
    fn test_percent_rule_ignores_idle_flag() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::Percent, 100.0);
        let reaction = machine.react(&refresh(MetadataRecord::file(PATH).resident()));
        assert!(!reaction.is_terminal());
    }

    #[test]
    fn test_progress_may_reset() {
        let mut machine = UploadMachine::new(PATH, UploadCompletion::Percent, 100.0);
        for percent in [60.0, 20.0] {
            let reaction = machine.react(&refresh(MetadataRecord::file(PATH).uploading(percent)));
            assert_eq!(reaction.events(), &[ChannelEvent::Progress(percent)]);
            assert!(!reaction.is_terminal());
        }
    }
}
