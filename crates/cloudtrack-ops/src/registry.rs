//! Channel registry: channel id to subscriber mapping.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use cloudtrack_core::{ChannelEvent, ChannelId, TrackError};

use crate::emitter::EventEmitter;

/// Callback run when the external subscriber of a channel disconnects.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SubscriberState {
    /// Set once a terminal event was emitted or the channel was cancelled.
    closed: bool,
    /// Whether a watch was ever bound to this channel.
    bound: bool,
    on_cancel: Option<CancelCallback>,
}

/// The registered receiver of one channel.
///
/// Clones share state. Once closed (by a terminal event or cancellation) every
/// further emission is a no-op, so a channel never sees anything after `End`
/// or `Error`.
#[derive(Clone)]
pub struct Subscriber {
    channel: ChannelId,
    emitter: Arc<dyn EventEmitter>,
    state: Arc<Mutex<SubscriberState>>,
}

impl Subscriber {
    fn new(channel: ChannelId, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            channel,
            emitter,
            state: Arc::new(Mutex::new(SubscriberState::default())),
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit a non-terminal event. Returns `false` if the channel is closed or
    /// its listener is gone.
    ///
    /// The host emitter runs without the state lock held, so it may cancel
    /// the channel from inside the call.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        if self.lock().closed {
            return false;
        }
        self.emitter.emit(&self.channel, event)
    }

    /// Emit a terminal event and close the channel. Returns `false` if the
    /// channel was already closed, in which case nothing is emitted.
    pub fn finish(&self, event: ChannelEvent) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.on_cancel = None;
        }
        match event {
            ChannelEvent::Error { .. } | ChannelEvent::End => {
                self.emitter.emit(&self.channel, event);
            }
            other => {
                self.emitter.emit(&self.channel, other);
                self.emitter.emit_end(&self.channel);
            }
        }
        self.emitter.close(&self.channel);
        true
    }

    /// Close the channel without emitting anything further.
    pub fn close(&self) {
        let was_open = {
            let mut state = self.lock();
            state.on_cancel = None;
            !std::mem::replace(&mut state.closed, true)
        };
        if was_open {
            self.emitter.close(&self.channel);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether a watch has been bound through [`Subscriber::set_on_cancel`].
    pub fn is_bound(&self) -> bool {
        self.lock().bound
    }

    /// Bind the channel to a watch. Only one binding per channel is allowed.
    pub fn set_on_cancel(&self, callback: CancelCallback) -> Result<(), TrackError> {
        let mut state = self.lock();
        if state.bound || state.closed {
            return Err(TrackError::DuplicateChannel {
                channel: self.channel.clone(),
            });
        }
        state.bound = true;
        state.on_cancel = Some(callback);
        Ok(())
    }

    /// Close the channel and run its cancel callback. Only the first call
    /// does anything; it returns `true`.
    fn cancel(&self) -> bool {
        let on_cancel = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.on_cancel.take()
        };
        if let Some(on_cancel) = on_cancel {
            on_cancel();
        }
        self.emitter.close(&self.channel);
        true
    }

    fn same_as(&self, other: &Subscriber) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Subscriber")
            .field("channel", &self.channel)
            .field("closed", &state.closed)
            .field("bound", &state.bound)
            .finish()
    }
}

/// Owns every live channel of a session.
///
/// Insertions and removals are atomic with respect to each other; lookups
/// never create entries.
pub struct ChannelRegistry {
    channels: DashMap<ChannelId, Subscriber>,
    emitter: Arc<dyn EventEmitter>,
}

impl ChannelRegistry {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            channels: DashMap::new(),
            emitter,
        }
    }

    /// Register a new channel.
    pub fn create(&self, channel: ChannelId) -> Result<Subscriber, TrackError> {
        match self.channels.entry(channel) {
            Entry::Occupied(entry) => Err(TrackError::DuplicateChannel {
                channel: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let subscriber = Subscriber::new(entry.key().clone(), Arc::clone(&self.emitter));
                entry.insert(subscriber.clone());
                tracing::debug!(channel = %subscriber.channel_id(), "channel created");
                Ok(subscriber)
            }
        }
    }

    pub fn get(&self, channel: &ChannelId) -> Option<Subscriber> {
        self.channels.get(channel).map(|entry| entry.value().clone())
    }

    /// Return the registered channel, registering it first if absent.
    pub fn get_or_create(&self, channel: ChannelId) -> Subscriber {
        let emitter = Arc::clone(&self.emitter);
        let key = channel.clone();
        self.channels
            .entry(channel)
            .or_insert_with(move || Subscriber::new(key, emitter))
            .value()
            .clone()
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.channels.contains_key(channel)
    }

    /// Remove a channel. Removing an absent id is a no-op.
    pub fn remove(&self, channel: &ChannelId) -> bool {
        self.channels.remove(channel).is_some()
    }

    /// Remove `subscriber`'s channel, unless the id has since been
    /// re-registered by someone else.
    pub fn release(&self, subscriber: &Subscriber) -> bool {
        self.channels
            .remove_if(subscriber.channel_id(), |_, current| current.same_as(subscriber))
            .is_some()
    }

    /// Install the cancel callback of a registered channel.
    pub fn set_on_cancel(
        &self,
        channel: &ChannelId,
        callback: CancelCallback,
    ) -> Result<(), TrackError> {
        let subscriber = self.get(channel).ok_or_else(|| TrackError::UnknownChannel {
            channel: channel.clone(),
        })?;
        subscriber.set_on_cancel(callback)
    }

    /// The external subscriber of `channel` disconnected.
    ///
    /// Removes the channel, then runs the cancel callback (which stops the
    /// bound watch). Safe to call from inside an emit and while a refresh is
    /// in flight. Idempotent: returns `false` if there was nothing to cancel.
    pub fn cancel(&self, channel: &ChannelId) -> bool {
        let Some(subscriber) = self.get(channel) else {
            return false;
        };
        self.disconnect(&subscriber)
    }

    /// Cancel `subscriber` itself, leaving a re-registered id alone.
    pub(crate) fn disconnect(&self, subscriber: &Subscriber) -> bool {
        let released = self.release(subscriber);
        let cancelled = subscriber.cancel();
        if cancelled || released {
            tracing::debug!(channel = %subscriber.channel_id(), "channel cancelled");
        }
        cancelled || released
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::emitter::MpscEmitter;

    fn registry() -> (Arc<MpscEmitter>, ChannelRegistry) {
        let emitter = Arc::new(MpscEmitter::new());
        let registry = ChannelRegistry::new(emitter.clone());
        (emitter, registry)
    }

    #[test]
    fn test_create_twice_fails() {
        let (_, registry) = registry();
        let channel = ChannelId::from("ch1");

        registry.create(channel.clone()).unwrap();
        let err = registry.create(channel.clone()).unwrap_err();
        assert!(matches!(err, TrackError::DuplicateChannel { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_, registry) = registry();
        let channel = ChannelId::from("ch1");

        registry.create(channel.clone()).unwrap();
        assert!(registry.remove(&channel));
        assert!(!registry.remove(&channel));
        assert!(registry.get(&channel).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_never_creates() {
        let (_, registry) = registry();
        assert!(registry.get(&ChannelId::from("ghost")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_runs_callback_once() {
        let (_, registry) = registry();
        let channel = ChannelId::from("ch1");
        let calls = Arc::new(AtomicUsize::new(0));

        registry.create(channel.clone()).unwrap();
        let counter = calls.clone();
        registry
            .set_on_cancel(
                &channel,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(registry.cancel(&channel));
        assert!(!registry.cancel(&channel));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(&channel));
    }

    #[test]
    fn test_second_binding_is_rejected() {
        let (_, registry) = registry();
        let channel = ChannelId::from("ch1");
        let subscriber = registry.create(channel.clone()).unwrap();

        subscriber.set_on_cancel(Box::new(|| {})).unwrap();
        assert!(subscriber.is_bound());
        assert!(subscriber.set_on_cancel(Box::new(|| {})).is_err());
    }

    #[test]
    fn test_set_on_cancel_unknown_channel() {
        let (_, registry) = registry();
        let err = registry
            .set_on_cancel(&ChannelId::from("ghost"), Box::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, TrackError::UnknownChannel { .. }));
    }

    #[test]
    fn test_nothing_after_terminal_event() {
        let (emitter, registry) = registry();
        let channel = ChannelId::from("ch1");
        let mut rx = emitter.listen(&channel);
        let subscriber = registry.create(channel.clone()).unwrap();

        assert!(subscriber.emit(ChannelEvent::Progress(10.0)));
        assert!(subscriber.finish(ChannelEvent::End));
        assert!(!subscriber.emit(ChannelEvent::Progress(20.0)));
        assert!(!subscriber.finish(ChannelEvent::End));

        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Progress(10.0));
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::End);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_cancel_keeps_new_listener() {
        let (emitter, registry) = registry();
        let channel = ChannelId::from("ch1");

        let old = registry.create(channel.clone()).unwrap();
        assert!(old.finish(ChannelEvent::End));
        registry.release(&old);

        registry.create(channel.clone()).unwrap();
        let mut rx = emitter.listen(&channel);
        assert!(!registry.disconnect(&old));

        assert!(emitter.is_listening(&channel));
        assert!(registry.get(&channel).unwrap().emit(ChannelEvent::Progress(5.0)));
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Progress(5.0));
    }

    #[test]
    fn test_release_keeps_reregistered_channel() {
        let (_, registry) = registry();
        let channel = ChannelId::from("ch1");

        let old = registry.create(channel.clone()).unwrap();
        registry.remove(&channel);
        registry.create(channel.clone()).unwrap();

        assert!(!registry.release(&old));
        assert!(registry.contains(&channel));
    }
}
