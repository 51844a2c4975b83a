//! Event sinks: how channel events leave the engine.

use dashmap::DashMap;
use tokio::sync::mpsc;

use cloudtrack_core::{ChannelEvent, ChannelId, TrackError};

/// Abstract "emit event to subscriber N" primitive provided by the host.
pub trait EventEmitter: Send + Sync {
    /// Deliver an event to the subscriber of `channel`.
    ///
    /// Returns `false` once the subscriber has disconnected; the engine then
    /// cancels the channel and stops its watch.
    fn emit(&self, channel: &ChannelId, event: ChannelEvent) -> bool;

    /// Deliver an error event.
    fn emit_error(&self, channel: &ChannelId, error: &TrackError) -> bool {
        self.emit(channel, ChannelEvent::from_error(error))
    }

    /// Deliver the end-of-stream marker.
    fn emit_end(&self, channel: &ChannelId) -> bool {
        self.emit(channel, ChannelEvent::End)
    }

    /// Release everything held for `channel`. No events follow.
    fn close(&self, channel: &ChannelId);
}

/// Emitter that fans events out to per-channel tokio receivers.
///
/// Hosts call [`MpscEmitter::listen`] to obtain the receiving half of a
/// channel; closing the channel drops the sender so the receiver yields
/// `None` once drained. Dropping the receiver counts as a disconnect: the
/// next emit on that channel reports it.
#[derive(Debug, Default)]
pub struct MpscEmitter {
    senders: DashMap<ChannelId, mpsc::UnboundedSender<ChannelEvent>>,
}

impl MpscEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener to `channel`, replacing any previous one.
    pub fn listen(&self, channel: &ChannelId) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(channel.clone(), tx);
        rx
    }

    /// Whether a listener is attached to `channel`.
    pub fn is_listening(&self, channel: &ChannelId) -> bool {
        self.senders.contains_key(channel)
    }
}

impl EventEmitter for MpscEmitter {
    fn emit(&self, channel: &ChannelId, event: ChannelEvent) -> bool {
        let delivered = match self.senders.get(channel) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::warn!(%channel, ?event, "no listener attached, dropping event");
                return true;
            }
        };
        if !delivered {
            tracing::debug!(%channel, "listener went away");
            self.senders.remove(channel);
        }
        delivered
    }

    fn close(&self, channel: &ChannelId) {
        self.senders.remove(channel);
    }
}
