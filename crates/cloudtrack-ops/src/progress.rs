//! Reaction types shared by the watched state machines.

use serde::{Deserialize, Serialize};

use cloudtrack_core::{ChannelEvent, Snapshot};

/// The kind of operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Gather,
    Upload,
    Download,
    Delete,
    Move,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gather => write!(f, "Gather"),
            Self::Upload => write!(f, "Upload"),
            Self::Download => write!(f, "Download"),
            Self::Delete => write!(f, "Delete"),
            Self::Move => write!(f, "Move"),
        }
    }
}

/// What a state machine wants done after one refresh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reaction {
    events: Vec<ChannelEvent>,
    terminal: bool,
}

impl Reaction {
    /// Nothing to report; keep watching.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Emit `events` and keep watching.
    pub fn emit(events: Vec<ChannelEvent>) -> Self {
        Self {
            events,
            terminal: false,
        }
    }

    /// Emit `events` and terminate. The last event is the terminal one.
    pub fn finish(events: Vec<ChannelEvent>) -> Self {
        Self {
            events,
            terminal: true,
        }
    }

    pub fn events(&self) -> &[ChannelEvent] {
        &self.events
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn into_parts(self) -> (Vec<ChannelEvent>, bool) {
        (self.events, self.terminal)
    }
}

/// A watched operation: turns refreshes into channel events.
pub trait StateMachine: Send + 'static {
    fn operation_type(&self) -> OperationType;

    /// React to one refresh. Never called again after a terminal reaction.
    fn react(&mut self, snapshot: &Snapshot) -> Reaction;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_parts() {
        let reaction = Reaction::finish(vec![ChannelEvent::Progress(100.0), ChannelEvent::End]);
        assert!(reaction.is_terminal());
        assert_eq!(reaction.events().len(), 2);

        let (events, terminal) = Reaction::idle().into_parts();
        assert!(events.is_empty());
        assert!(!terminal);
    }

    #[test]
    fn test_operation_type_display() {
        assert_eq!(OperationType::Download.to_string(), "Download");
        assert_eq!(OperationType::Gather.to_string(), "Gather");
    }
}
