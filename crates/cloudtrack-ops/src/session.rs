//! Binding of a state machine to a watch and a channel.

use std::sync::Arc;

use cloudtrack_core::{ChannelEvent, Snapshot, TrackError};

use crate::progress::StateMachine;
use crate::registry::{ChannelRegistry, Subscriber};
use crate::watch::MetadataWatch;

/// Runs a [`StateMachine`] on every refresh of a watch and routes its
/// reactions to a channel.
///
/// A terminal reaction emits everything but its last event, stops the watch,
/// removes the channel and only then emits the terminal event. Without a
/// channel the machine still runs to completion and its outcome is logged.
pub(crate) struct WatchSession<M> {
    machine: M,
    subscriber: Option<Subscriber>,
    registry: Arc<ChannelRegistry>,
    watch: Arc<MetadataWatch>,
}

impl<M: StateMachine> WatchSession<M> {
    /// Bind the channel (if any) to the watch without starting it.
    ///
    /// Fails with [`TrackError::DuplicateChannel`] if the channel already
    /// drives another watch or was cancelled.
    pub(crate) fn bind(
        machine: M,
        subscriber: Option<Subscriber>,
        registry: Arc<ChannelRegistry>,
        watch: Arc<MetadataWatch>,
    ) -> Result<Self, TrackError> {
        if let Some(subscriber) = &subscriber {
            let on_cancel = Arc::clone(&watch);
            subscriber.set_on_cancel(Box::new(move || on_cancel.stop()))?;
        }
        Ok(Self {
            machine,
            subscriber,
            registry,
            watch,
        })
    }

    /// Bind and start in one step.
    pub(crate) fn launch(
        machine: M,
        subscriber: Option<Subscriber>,
        registry: Arc<ChannelRegistry>,
        watch: Arc<MetadataWatch>,
    ) -> Result<(), TrackError> {
        Self::bind(machine, subscriber, registry, watch)?.start()
    }

    /// Start delivering refreshes. A start failure releases the channel.
    pub(crate) fn start(self) -> Result<(), TrackError> {
        let operation = self.machine.operation_type();
        let subscriber = self.subscriber.clone();
        let registry = Arc::clone(&self.registry);
        let watch = Arc::clone(&self.watch);

        let mut session = self;
        if let Err(e) = watch.start(move |snapshot| session.on_refresh(&snapshot)) {
            tracing::warn!(%operation, error = %e, "failed to start watch");
            if let Some(subscriber) = subscriber {
                registry.release(&subscriber);
                subscriber.close();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Give up on a bound session that never started.
    pub(crate) fn abort(self) {
        self.watch.stop();
        if let Some(subscriber) = &self.subscriber {
            self.registry.release(subscriber);
            subscriber.close();
        }
    }

    fn on_refresh(&mut self, snapshot: &Snapshot) {
        if self.watch.is_stopped() {
            return;
        }
        if self.subscriber.as_ref().is_some_and(Subscriber::is_closed) {
            self.watch.stop();
            return;
        }

        let (mut events, terminal) = self.machine.react(snapshot).into_parts();
        if !terminal {
            for event in events {
                if !self.emit(event) {
                    self.disconnect();
                    return;
                }
            }
            return;
        }

        let last = events.pop();
        for event in events {
            self.emit(event);
        }

        self.watch.stop();
        let operation = self.machine.operation_type();
        match &last {
            Some(ChannelEvent::Error { kind, message }) => {
                tracing::info!(%operation, %kind, %message, "operation failed");
            }
            _ => tracing::info!(%operation, "operation finished"),
        }

        if let Some(subscriber) = &self.subscriber {
            self.registry.release(subscriber);
            match last {
                Some(event) => {
                    subscriber.finish(event);
                }
                None => subscriber.close(),
            }
        }
    }

    /// The channel closed or its listener left mid-stream.
    fn disconnect(&self) {
        self.watch.stop();
        if let Some(subscriber) = &self.subscriber {
            self.registry.disconnect(subscriber);
        }
        let operation = self.machine.operation_type();
        tracing::debug!(%operation, "subscriber gone, watch stopped");
    }

    fn emit(&self, event: ChannelEvent) -> bool {
        match &self.subscriber {
            Some(subscriber) => subscriber.emit(event),
            None => true,
        }
    }
}
