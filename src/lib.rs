//! # fs-entity
//!
//! `fs-entity` models a single local file as a live, observable entity.
//! Its metadata (name, path, size, hash, existence, MIME type) is derived
//! asynchronously from the filesystem and kept in sync by a change watcher;
//! consumers observe state transitions through events instead of polling.
//!
//! The central type is [`FileEntity`], which composes three injected
//! collaborators: a [`MetadataProvider`] resolving descriptive attributes,
//! a [`WatchService`] delivering change notifications, and a
//! [`StorageDriver`] performing low-level file I/O. Default implementations
//! over the local filesystem are provided for all of them; tests substitute
//! fakes.

mod dialog;
mod entity;
mod errors;
mod events;
mod metadata;
mod storage;
mod watch;

pub use dialog::{
    FileFilter, NoSaveDialog, SaveDialog, ShellOpener, SystemOpener,
};
pub use entity::{
    FileContext, FileEntity, FileOptions, FileState, SIZE_UNKNOWN,
};
pub use errors::{FileError, Result};
pub use events::{EventEmitter, FileEvent, ListenerId};
pub use metadata::{FileMetadata, FsMetadataProvider, MetadataProvider};
pub use storage::{FsStorageDriver, StorageDriver};
pub use watch::{
    ChangeKind, NotifyWatchService, WatchService, WatchSubscription,
};
