//! Directory listing.

use std::path::Path;

use cloudtrack_core::{path_string, ChannelEvent, FileInfo, Snapshot};

use crate::progress::{OperationType, Reaction, StateMachine};

/// Maps refreshes of a container-wide watch to file lists.
///
/// Streamed gathers emit the full list on every refresh and never terminate
/// on their own; one-shot gathers use [`GatherMachine::collect`] on the first
/// refresh only.
#[derive(Debug, Clone)]
pub struct GatherMachine {
    container_root: String,
}

impl GatherMachine {
    pub fn new(container_root: &Path) -> Self {
        Self {
            container_root: path_string(container_root),
        }
    }

    /// File entries of a snapshot, directories excluded.
    pub fn collect(&self, snapshot: &Snapshot) -> Vec<FileInfo> {
        snapshot
            .records()
            .iter()
            .filter_map(|record| FileInfo::from_record(record, &self.container_root))
            .collect()
    }
}

impl StateMachine for GatherMachine {
    fn operation_type(&self) -> OperationType {
        OperationType::Gather
    }

    fn react(&mut self, snapshot: &Snapshot) -> Reaction {
        Reaction::emit(vec![ChannelEvent::FileList(self.collect(snapshot))])
    }
}

#[cfg(test)]
mod tests {
    use cloudtrack_core::MetadataRecord;

    use super::*;

    #[test]
    fn test_collect_strips_container_and_skips_directories() {
        let machine = GatherMachine::new(Path::new("/cloud/X"));
        let snapshot = Snapshot::new(vec![
            MetadataRecord::file("/cloud/X/a.txt").with_size(3),
            MetadataRecord::directory("/cloud/X/docs"),
            MetadataRecord::file("/cloud/X/docs/b.txt"),
        ]);

        let files = machine.collect(&snapshot);
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "docs/b.txt"]);
        assert_eq!(files[0].size_in_bytes, Some(3));
    }

    #[test]
    fn test_streamed_gather_never_terminates() {
        let mut machine = GatherMachine::new(Path::new("/cloud/X"));

        let reaction = machine.react(&Snapshot::default());
        assert!(!reaction.is_terminal());
        assert_eq!(reaction.events(), &[ChannelEvent::FileList(Vec::new())]);

        let reaction = machine.react(&Snapshot::new(vec![MetadataRecord::file("/cloud/X/a.txt")]));
        assert!(!reaction.is_terminal());
    }
}
