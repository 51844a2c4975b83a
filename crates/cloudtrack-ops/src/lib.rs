//! Operation tracking engine for cloudtrack.
//!
//! This crate turns raw, possibly repeated metadata refreshes from a remote
//! provider into clean per-operation event streams. Each watched operation
//! (gather, upload, download) runs a small state machine on every refresh of
//! its [`MetadataWatch`] and reports through a channel registered in the
//! [`ChannelRegistry`]; deletes and moves are plain coordinated filesystem
//! mutations. The [`Dispatcher`] routes requests to the right operation.

mod coordinator;
mod copy;
mod delete;
mod dispatcher;
mod download;
mod emitter;
mod gather;
mod local;
mod memory;
mod move_op;
mod operation;
mod progress;
mod provider;
mod registry;
mod session;
mod upload;
mod watch;

pub use coordinator::{WriteCoordinator, WriteGuard};
pub use copy::{copy_into_container, materialize, replace_with_copy, resolve_in};
pub use delete::delete_item;
pub use dispatcher::Dispatcher;
pub use download::DownloadMachine;
pub use emitter::{EventEmitter, MpscEmitter};
pub use gather::GatherMachine;
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use move_op::move_item;
pub use operation::{channel_of, Operation, Response};
pub use progress::{OperationType, Reaction, StateMachine};
pub use provider::{MetadataProvider, RefreshHandler, SubscriptionId};
pub use registry::{CancelCallback, ChannelRegistry, Subscriber};
pub use upload::UploadMachine;
pub use watch::{MetadataWatch, WatchPhase};
