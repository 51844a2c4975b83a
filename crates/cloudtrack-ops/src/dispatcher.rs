//! Request routing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use cloudtrack_core::{
    path_string, ChannelId, FileInfo, MetadataQuery, PathPredicate, TrackError, TrackerConfig,
};

use crate::coordinator::WriteCoordinator;
use crate::copy::{copy_into_container, resolve_in};
use crate::delete::delete_item;
use crate::download::DownloadMachine;
use crate::emitter::EventEmitter;
use crate::gather::GatherMachine;
use crate::move_op::move_item;
use crate::operation::{channel_of, Operation, Response};
use crate::provider::MetadataProvider;
use crate::registry::{ChannelRegistry, Subscriber};
use crate::session::WatchSession;
use crate::upload::UploadMachine;
use crate::watch::MetadataWatch;

/// One session of the engine: owns the channel registry and routes requests
/// to the matching operation.
pub struct Dispatcher {
    provider: Arc<dyn MetadataProvider>,
    registry: Arc<ChannelRegistry>,
    coordinator: WriteCoordinator,
    config: TrackerConfig,
    default_container: Mutex<Option<String>>,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        emitter: Arc<dyn EventEmitter>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            provider,
            registry: Arc::new(ChannelRegistry::new(emitter)),
            coordinator: WriteCoordinator::new(),
            config,
            default_container: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Route a request to its operation.
    pub async fn dispatch(&self, operation: Operation) -> Result<Response, TrackError> {
        operation.validate()?;
        tracing::debug!(method = operation.method(), "dispatching");

        match operation {
            Operation::Initialize { container_id } => {
                self.initialize(&container_id)?;
                Ok(Response::Ack)
            }
            Operation::CreateChannel { channel_id } => {
                self.create_channel(ChannelId::new(channel_id))?;
                Ok(Response::Ack)
            }
            Operation::CancelChannel { channel_id } => {
                self.cancel_channel(&ChannelId::new(channel_id));
                Ok(Response::Ack)
            }
            Operation::Gather {
                container_id,
                channel_id,
            } => {
                self.gather(container_id.as_deref(), channel_of(channel_id.as_deref()))
                    .await
            }
            Operation::Upload {
                container_id,
                local_path,
                remote_name,
                channel_id,
            } => {
                self.upload(
                    container_id.as_deref(),
                    &local_path,
                    &remote_name,
                    channel_of(channel_id.as_deref()),
                )
                .await?;
                Ok(Response::Ack)
            }
            Operation::Download {
                container_id,
                remote_name,
                local_path,
                channel_id,
            } => {
                self.download(
                    container_id.as_deref(),
                    &remote_name,
                    &local_path,
                    channel_of(channel_id.as_deref()),
                )
                .await?;
                Ok(Response::Ack)
            }
            Operation::Delete {
                container_id,
                remote_name,
            } => {
                self.delete(container_id.as_deref(), &remote_name).await?;
                Ok(Response::Ack)
            }
            Operation::Move {
                container_id,
                from_relative_path,
                to_relative_path,
            } => {
                self.move_item(
                    container_id.as_deref(),
                    &from_relative_path,
                    &to_relative_path,
                )
                .await?;
                Ok(Response::Ack)
            }
        }
    }

    /// Parse and route a JSON request.
    pub async fn dispatch_json(&self, json: &str) -> Result<Response, TrackError> {
        self.dispatch(Operation::from_json(json)?).await
    }

    /// Set the container used by requests that do not name one.
    pub fn initialize(&self, container_id: &str) -> Result<(), TrackError> {
        if container_id.is_empty() {
            return Err(TrackError::argument("containerId is required"));
        }
        *self
            .default_container
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(container_id.to_string());
        tracing::debug!(container_id, "default container set");
        Ok(())
    }

    pub fn create_channel(&self, channel: ChannelId) -> Result<(), TrackError> {
        if channel.is_empty() {
            return Err(TrackError::argument("channelId is required"));
        }
        self.registry.create(channel).map(|_| ())
    }

    /// Cancel a channel on behalf of its departed subscriber. Idempotent.
    pub fn cancel_channel(&self, channel: &ChannelId) {
        self.registry.cancel(channel);
    }

    /// List the files of a container.
    ///
    /// Without a channel the first refresh is returned as the result and the
    /// watch stops. With one, every refresh streams a `FileList` until the
    /// channel is cancelled.
    pub async fn gather(
        &self,
        container_id: Option<&str>,
        channel: Option<ChannelId>,
    ) -> Result<Response, TrackError> {
        let root = self.container_root(container_id)?;
        let machine = GatherMachine::new(&root);
        let watch = self.watch(PathPredicate::under(&root));

        if let Some(channel) = channel {
            let subscriber = self.subscriber(channel);
            WatchSession::launch(machine, Some(subscriber), Arc::clone(&self.registry), watch)?;
            return Ok(Response::Ack);
        }

        let (tx, rx) = oneshot::channel::<Vec<FileInfo>>();
        let mut tx = Some(tx);
        watch.start(move |snapshot| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(machine.collect(&snapshot));
            }
        })?;

        let files = rx.await;
        watch.stop();
        let files =
            files.map_err(|_| TrackError::provider("watch stopped before the initial gather"))?;
        tracing::info!(count = files.len(), root = %root.display(), "gathered files");
        Ok(Response::Files(files))
    }

    /// Copy a local file into the container and, with a channel, track its
    /// upload.
    ///
    /// The channel is bound before anything is copied, so a channel that
    /// already drives a watch fails the call with the container untouched.
    /// Without a channel the call returns as soon as the local copy is done.
    pub async fn upload(
        &self,
        container_id: Option<&str>,
        local_path: &Path,
        remote_name: &str,
        channel: Option<ChannelId>,
    ) -> Result<(), TrackError> {
        let root = self.container_root(container_id)?;
        let dest = resolve_in(&root, remote_name)?;

        let session = match channel {
            Some(channel) => {
                let machine = UploadMachine::new(
                    path_string(&dest),
                    self.config.upload_completion,
                    self.config.complete_percent,
                );
                let subscriber = self.subscriber(channel);
                let watch = self.watch(PathPredicate::exact(&dest));
                Some(WatchSession::bind(
                    machine,
                    Some(subscriber),
                    Arc::clone(&self.registry),
                    watch,
                )?)
            }
            None => None,
        };

        let source = local_path.to_path_buf();
        let target = dest.clone();
        let create_parents = self.config.create_container_on_upload;
        let copied = tokio::task::spawn_blocking(move || {
            copy_into_container(&source, &target, create_parents)
        })
        .await
        .map_err(|e| TrackError::provider(format!("copy task failed: {e}")))
        .and_then(|copied| copied);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Some(session) = session {
                    session.abort();
                }
                return Err(e);
            }
        };
        tracing::debug!(dest = %dest.display(), bytes, "copied into container");

        match session {
            Some(session) => session.start(),
            None => Ok(()),
        }
    }

    /// Ask the provider to materialize a remote file and, with a channel,
    /// copy it to `local_path` once it is current.
    ///
    /// A refused trigger fails the call. Without a channel nothing is
    /// watched: the provider materializes the file on its own and no local
    /// copy is made.
    pub async fn download(
        &self,
        container_id: Option<&str>,
        remote_name: &str,
        local_path: &Path,
        channel: Option<ChannelId>,
    ) -> Result<(), TrackError> {
        let root = self.container_root(container_id)?;
        let remote = resolve_in(&root, remote_name)?;

        let Some(channel) = channel else {
            self.provider.start_downloading(&remote)?;
            tracing::debug!(remote = %remote.display(), "download triggered without a channel");
            return Ok(());
        };

        let machine = DownloadMachine::new(&remote, local_path);
        let subscriber = self.subscriber(channel);
        let watch = self.watch(PathPredicate::exact(&remote));
        let session =
            WatchSession::bind(machine, Some(subscriber), Arc::clone(&self.registry), watch)?;

        if let Err(e) = self.provider.start_downloading(&remote) {
            session.abort();
            return Err(e);
        }
        session.start()
    }

    pub async fn delete(
        &self,
        container_id: Option<&str>,
        remote_name: &str,
    ) -> Result<(), TrackError> {
        let root = self.container_root(container_id)?;
        let target = resolve_in(&root, remote_name)?;
        delete_item(&self.coordinator, target).await
    }

    pub async fn move_item(
        &self,
        container_id: Option<&str>,
        from_relative_path: &str,
        to_relative_path: &str,
    ) -> Result<(), TrackError> {
        let root = self.container_root(container_id)?;
        let from = resolve_in(&root, from_relative_path)?;
        let to = resolve_in(&root, to_relative_path)?;
        move_item(&self.coordinator, from, to).await
    }

    fn container_root(&self, container_id: Option<&str>) -> Result<PathBuf, TrackError> {
        let requested = container_id.filter(|id| !id.is_empty()).map(str::to_string);
        let container_id = match requested {
            Some(id) => id,
            None => self
                .default_container
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .ok_or_else(|| TrackError::argument("containerId is required"))?,
        };

        let root = self.provider.container_root(&container_id)?;
        tracing::debug!(%container_id, root = %root.display(), "resolved container");
        Ok(root)
    }

    fn watch(&self, predicate: PathPredicate) -> Arc<MetadataWatch> {
        let query = MetadataQuery::new(predicate, self.config.scopes.clone());
        Arc::new(MetadataWatch::new(Arc::clone(&self.provider), query))
    }

    fn subscriber(&self, channel: ChannelId) -> Subscriber {
        self.registry.get_or_create(channel)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
