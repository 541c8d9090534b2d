use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
    dialog::{FileFilter, NoSaveDialog, SaveDialog, ShellOpener, SystemOpener},
    errors::{FileError, Result},
    events::{EventEmitter, FileEvent, ListenerId},
    metadata::{FileMetadata, FsMetadataProvider, MetadataProvider},
    storage::{self, FsStorageDriver, StorageDriver},
    watch::{NotifyWatchService, WatchService},
};

/// Sentinel size for files whose metadata has not been loaded or which do
/// not exist.
pub const SIZE_UNKNOWN: i64 = -1;

const PHOTO_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];
const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "gif"];

/// Immutable snapshot of a file's descriptive attributes.
///
/// Snapshots are replaced wholesale by the reload pipeline, never patched,
/// so readers can never observe a mix of old and new fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// Normalized, forward-slash-separated path; the entity's identity.
    pub path: String,
    pub directory: String,
    pub name: String,
    /// Lower-cased extension without a leading dot.
    pub extension: String,
    /// `name` + `.` + `extension` (just `name` when there is no extension).
    pub full_name: String,
    /// Size in bytes, [`SIZE_UNKNOWN`] until loaded or when missing.
    pub size: i64,
    pub exists: bool,
    pub mime_type: Option<String>,
    /// Content digest; only meaningful while `exists` is true.
    pub content_hash: Option<String>,
    pub created_at: Option<SystemTime>,
    /// In-memory base64 representation, populated only when the
    /// `store_data_url` option is set.
    pub data_url: Option<String>,
}

impl FileState {
    /// The canonical reference to hand to a renderer or HTTP layer: the
    /// data URL when present, the path otherwise.
    pub fn url(&self) -> &str {
        match &self.data_url {
            Some(data_url) => data_url,
            None => &self.path,
        }
    }

    /// Identity-only state for a freshly constructed, not yet loaded
    /// entity.
    fn stub(path: &str) -> Self {
        let path = storage::normalize(path);
        let (directory, name, extension) = storage::split(&path);
        let full_name = compose_full_name(&name, &extension);
        FileState {
            path,
            directory,
            name,
            extension,
            full_name,
            size: SIZE_UNKNOWN,
            exists: false,
            mime_type: None,
            content_hash: None,
            created_at: None,
            data_url: None,
        }
    }

    fn from_metadata(meta: &FileMetadata) -> Self {
        let name = meta.name.clone();
        let extension = meta
            .ext
            .trim_start_matches('.')
            .to_lowercase();
        let full_name = compose_full_name(&name, &extension);
        let directory = storage::normalize(&meta.dir);
        let path = storage::join(&directory, &full_name);
        FileState {
            path,
            directory,
            name,
            extension,
            full_name,
            size: if meta.exists { meta.size } else { SIZE_UNKNOWN },
            exists: meta.exists,
            mime_type: meta.mimetype.clone(),
            content_hash: meta.hash.clone(),
            created_at: meta.birthtime,
            data_url: meta.data_url.clone(),
        }
    }
}

fn compose_full_name(name: &str, extension: &str) -> String {
    if extension.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", name, extension)
    }
}

/// Construction options, merged over defaults.
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Best-effort delete of any existing file at the path during setup.
    pub delete_if_exists: bool,
    /// Trigger the initial reload without awaiting it; fields stay stale
    /// until the `Loaded` event fires.
    pub async_load: bool,
    /// Populate `data_url` on reload. Off by default to avoid unbounded
    /// memory use for large files.
    pub store_data_url: bool,
    /// Register a filesystem watch that reloads on any change.
    pub watch: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        FileOptions {
            delete_if_exists: false,
            async_load: false,
            store_data_url: false,
            watch: true,
        }
    }
}

/// The collaborators an entity operates through, injected at construction
/// so tests can substitute fakes.
#[derive(Clone)]
pub struct FileContext {
    pub metadata: Arc<dyn MetadataProvider>,
    pub storage: Arc<dyn StorageDriver>,
    pub watcher: Arc<dyn WatchService>,
    pub dialog: Arc<dyn SaveDialog>,
    pub shell: Arc<dyn ShellOpener>,
}

impl Default for FileContext {
    fn default() -> Self {
        FileContext {
            metadata: Arc::new(FsMetadataProvider),
            storage: Arc::new(FsStorageDriver),
            watcher: Arc::new(NotifyWatchService::new()),
            dialog: Arc::new(NoSaveDialog),
            shell: Arc::new(SystemOpener),
        }
    }
}

impl std::fmt::Debug for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileContext")
    }
}

/// A single local file as a live, observable entity.
///
/// Descriptive fields are derived asynchronously from the filesystem by the
/// reload pipeline and kept in sync by a change watcher; consumers observe
/// transitions through [`FileEvent`]s instead of polling.
///
/// ## Examples
/// ```no_run
/// use fs_entity::{FileContext, FileEntity, FileEvent, FileOptions};
///
/// # async fn demo() -> fs_entity::Result<()> {
/// let file = FileEntity::from_path(
///     "/tmp/a.jpg",
///     FileOptions::default(),
///     FileContext::default(),
/// )
/// .await?;
///
/// file.subscribe(|event| {
///     if event == FileEvent::Loaded {
///         // re-read state here
///     }
/// });
///
/// assert_eq!(file.full_name(), "a.jpg");
/// file.validate_as_photo()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileEntity {
    options: FileOptions,
    ctx: FileContext,
    state: RwLock<FileState>,
    emitter: EventEmitter,
    /// Next reload ticket; see `applied_seq`.
    reload_seq: AtomicU64,
    /// Highest reload ticket whose result has been applied. A completed
    /// reload with a lower ticket is stale and gets discarded, so
    /// overlapping reloads cannot reorder state.
    applied_seq: AtomicU64,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl FileEntity {
    /// Construct an entity and run setup (delete-if-exists, optional
    /// background load, watch registration) without awaiting a reload.
    ///
    /// Must be called within a Tokio runtime when `watch` or `async_load`
    /// is enabled.
    pub fn new(
        path: &str,
        options: FileOptions,
        ctx: FileContext,
    ) -> Arc<Self> {
        let entity = Arc::new(FileEntity {
            options,
            ctx,
            state: RwLock::new(FileState::stub(path)),
            emitter: EventEmitter::new(),
            reload_seq: AtomicU64::new(0),
            applied_seq: AtomicU64::new(0),
            watch_task: Mutex::new(None),
        });
        entity.setup();
        entity
    }

    /// Construct from a path and await the first full metadata load.
    pub async fn from_path(
        path: &str,
        options: FileOptions,
        ctx: FileContext,
    ) -> Result<Arc<Self>> {
        let entity = Self::new(path, options, ctx);
        entity.reload(None).await?;
        Ok(entity)
    }

    /// Construct from pre-fetched metadata, applying it as if a reload had
    /// completed. Never touches the filesystem; no watch is registered and
    /// the delete/async-load options are not honored, since there may be
    /// no real file behind the metadata.
    pub fn from_metadata(
        meta: &FileMetadata,
        options: FileOptions,
        ctx: FileContext,
    ) -> Arc<Self> {
        Arc::new(FileEntity {
            options,
            ctx,
            state: RwLock::new(FileState::from_metadata(meta)),
            emitter: EventEmitter::new(),
            reload_seq: AtomicU64::new(1),
            applied_seq: AtomicU64::new(1),
            watch_task: Mutex::new(None),
        })
    }

    fn setup(self: &Arc<Self>) {
        let path = self.path();

        if self.options.delete_if_exists {
            // Best-effort: the file may legitimately not exist yet
            if self.ctx.storage.exists(&path) {
                if let Err(e) = self.ctx.storage.unlink(&path) {
                    log::warn!(
                        "Could not delete existing file {}: {}",
                        path,
                        e
                    );
                }
            }
        }

        if self.options.async_load {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.reload(None).await {
                    log::error!(
                        "Background load of {} failed: {}",
                        this.path(),
                        e
                    );
                }
            });
        }

        if self.options.watch {
            self.register_watch();
        }
    }

    /// Register the change watch, collapsing any burst of filesystem
    /// events into repeated full reloads. Idempotent: an already-watching
    /// entity is left alone.
    fn register_watch(self: &Arc<Self>) {
        let mut slot = self.watch_task.lock().unwrap();
        if slot.is_some() {
            log::trace!("Already watching {}, not re-registering", self.path());
            return;
        }

        let path = PathBuf::from(self.path());
        let mut subscription = match self.ctx.watcher.watch(&path) {
            Ok(subscription) => subscription,
            Err(e) => {
                log::error!("Failed to watch {:?}: {}", path, e);
                return;
            }
        };

        // The task holds only a weak reference, otherwise the entity could
        // never be dropped while its own watch is alive
        let this: Weak<FileEntity> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(change) = subscription.events.recv().await {
                let Some(entity) = this.upgrade() else {
                    break;
                };
                log::debug!(
                    "Change {:?} on {}, reloading",
                    change,
                    entity.path()
                );
                if let Err(e) = entity.reload(None).await {
                    log::error!("Watch-triggered reload failed: {}", e);
                }
            }
        });
        *slot = Some(task);
    }

    /// Stop the change watch. After this the entity no longer reloads on
    /// filesystem changes; all other operations keep working.
    pub fn dispose(&self) {
        // Recover from poisoning here: dispose also runs from Drop, and a
        // second panic while unwinding would abort the process
        let task = self
            .watch_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            log::debug!("Stopped watch task");
        }
    }

    // ---- reload pipeline ----

    /// Re-derive every descriptive field from the filesystem.
    ///
    /// With a `path` argument the entity is re-pointed at that path
    /// (rename-aware reload); without one, identity is preserved and only
    /// descriptive fields refresh. Safe to call concurrently: each reload
    /// takes a monotonic ticket and only the highest completed ticket is
    /// applied, stale results are discarded without a `Loaded` event.
    pub async fn reload(&self, path: Option<&str>) -> Result<FileState> {
        let target = match path {
            Some(path) => storage::normalize(path),
            None => self.path(),
        };
        let ticket = self.reload_seq.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Reloading {} (ticket {})", target, ticket);

        self.emitter.emit(FileEvent::Loading);

        let meta = self
            .ctx
            .metadata
            .get_metadata(&target, self.options.store_data_url)
            .await?;
        let state = FileState::from_metadata(&meta);

        {
            let mut current = self.state.write().unwrap();
            let applied = self.applied_seq.load(Ordering::SeqCst);
            if ticket <= applied {
                log::trace!(
                    "Discarding stale reload of {} (ticket {} <= {})",
                    target,
                    ticket,
                    applied
                );
                return Ok(current.clone());
            }
            self.applied_seq.store(ticket, Ordering::SeqCst);
            *current = state.clone();
        }

        self.emitter.emit(FileEvent::Loaded);
        Ok(state)
    }

    // ---- observation ----

    /// Register a listener for lifecycle events. Delivery is synchronous
    /// and carries no payload; re-read the entity's state on receipt.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(FileEvent) + Send + Sync + 'static,
    {
        self.emitter.subscribe(listener)
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }

    /// Clone of the current snapshot.
    pub fn state(&self) -> FileState {
        self.state.read().unwrap().clone()
    }

    pub fn path(&self) -> String {
        self.state.read().unwrap().path.clone()
    }

    pub fn directory(&self) -> String {
        self.state.read().unwrap().directory.clone()
    }

    pub fn name(&self) -> String {
        self.state.read().unwrap().name.clone()
    }

    pub fn extension(&self) -> String {
        self.state.read().unwrap().extension.clone()
    }

    pub fn full_name(&self) -> String {
        self.state.read().unwrap().full_name.clone()
    }

    pub fn size(&self) -> i64 {
        self.state.read().unwrap().size
    }

    pub fn exists(&self) -> bool {
        self.state.read().unwrap().exists
    }

    pub fn mime_type(&self) -> Option<String> {
        self.state.read().unwrap().mime_type.clone()
    }

    pub fn content_hash(&self) -> Option<String> {
        self.state.read().unwrap().content_hash.clone()
    }

    pub fn created_at(&self) -> Option<SystemTime> {
        self.state.read().unwrap().created_at
    }

    pub fn data_url(&self) -> Option<String> {
        self.state.read().unwrap().data_url.clone()
    }

    /// Data URL when present, path otherwise.
    pub fn url(&self) -> String {
        self.state.read().unwrap().url().to_string()
    }

    // ---- validation ----

    /// Guard that the file exists and is a jpeg, png or gif.
    pub fn validate_as_photo(&self) -> Result<()> {
        let state = self.state.read().unwrap();
        if !state.exists {
            return Err(FileError::Missing {
                path: state.path.clone(),
            });
        }
        match state.mime_type.as_deref() {
            Some(mime) if PHOTO_MIME_TYPES.contains(&mime) => Ok(()),
            _ => Err(FileError::NotAPhoto {
                path: state.path.clone(),
            }),
        }
    }

    /// Guard that the file exists and carries the expected MIME type.
    pub fn validate_as(&self, expected: &str) -> Result<()> {
        let state = self.state.read().unwrap();
        if !state.exists {
            return Err(FileError::Missing {
                path: state.path.clone(),
            });
        }
        if state.mime_type.as_deref() != Some(expected) {
            return Err(FileError::WrongType {
                path: state.path.clone(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    // ---- mutating operations ----
    //
    // These delegate to the storage driver and emit a completion event.
    // None of them update descriptive fields: if the bytes changed on
    // disk, the active watch triggers the reload.

    /// Delete the underlying file. No-op (and no event) when it does not
    /// exist on disk.
    pub fn unlink(&self) -> Result<()> {
        let path = self.path();
        if !self.ctx.storage.exists(&path) {
            log::trace!("unlink: {} does not exist, nothing to do", path);
            return Ok(());
        }
        self.ctx.storage.unlink(&path)?;
        self.emitter.emit(FileEvent::Deleted);
        Ok(())
    }

    /// Write raw content to the entity's path.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.ctx.storage.write(&self.path(), data)?;
        self.emitter.emit(FileEvent::Written);
        Ok(())
    }

    /// Write decoded data-URL content to the entity's path.
    pub fn write_data_url(&self, data_url: &str) -> Result<()> {
        self.ctx
            .storage
            .write_data_url(&self.path(), data_url)?;
        self.emitter.emit(FileEvent::Written);
        Ok(())
    }

    /// Copy another entity's file over this entity's path.
    pub fn write_file(&self, other: &FileEntity) -> Result<()> {
        self.ctx
            .storage
            .copy(&other.path(), &self.path())?;
        self.emitter.emit(FileEvent::Written);
        Ok(())
    }

    /// Copy the underlying file to `destination`. No-op (and no event)
    /// when it does not exist on disk.
    pub fn copy(&self, destination: &str) -> Result<()> {
        let path = self.path();
        if !self.ctx.storage.exists(&path) {
            log::trace!("copy: {} does not exist, nothing to do", path);
            return Ok(());
        }
        self.ctx
            .storage
            .copy(&path, &storage::normalize(destination))?;
        self.emitter.emit(FileEvent::Copied);
        Ok(())
    }

    /// Prompt a save dialog (pre-filtered to photo extensions) and copy
    /// the file to the chosen destination. Cancellation is a no-op.
    ///
    /// Fails with [`FileError::Gone`] when the file is absent on disk at
    /// call time, before any dialog is shown.
    pub fn save(&self, default_path: &str) -> Result<()> {
        let path = self.path();
        if !self.ctx.storage.exists(&path) {
            return Err(FileError::Gone { path });
        }

        let filters = [FileFilter::new("Images", PHOTO_EXTENSIONS)];
        match self
            .ctx
            .dialog
            .prompt(Path::new(default_path), &filters)
        {
            Some(destination) => {
                self.copy(&destination.to_string_lossy())
            }
            None => {
                log::debug!("Save of {} cancelled", path);
                Ok(())
            }
        }
    }

    /// Reveal the file with the OS default handler.
    ///
    /// Fails with [`FileError::Gone`] when the file is absent on disk at
    /// call time.
    pub fn open_item(&self) -> Result<()> {
        let path = self.path();
        if !self.ctx.storage.exists(&path) {
            return Err(FileError::Gone { path });
        }
        self.ctx.shell.open(&path)
    }
}

impl Drop for FileEntity {
    fn drop(&mut self) {
        self.dispose();
    }
}
