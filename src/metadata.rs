use std::{
    fs,
    io::{BufRead, BufReader},
    path::Path,
    time::SystemTime,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{FileError, Result};
use crate::storage;

const KILOBYTE: usize = 1024;
const BUFFER_CAPACITY: usize = 512 * KILOBYTE;

/// Descriptive attributes of a file, as resolved from its path.
///
/// This is the unit of exchange of the reload pipeline: a provider produces
/// one, the entity applies it atomically. It can also be supplied directly
/// (e.g. deserialized from the result of a prior operation) to construct an
/// entity without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File name without extension.
    pub name: String,
    /// Extension; a leading dot is tolerated and stripped on apply.
    pub ext: String,
    /// Parent directory, forward-slash separated.
    pub dir: String,
    /// MIME type guessed from the path, if any.
    pub mimetype: Option<String>,
    /// Size in bytes; -1 when the file does not exist.
    pub size: i64,
    pub exists: bool,
    /// Content digest (lowercase hex), absent for missing files.
    pub hash: Option<String>,
    /// Creation time, falling back to modification time where the
    /// filesystem does not track birth times.
    pub birthtime: Option<SystemTime>,
    /// Base64 `data:` URL of the content, only populated on request.
    pub data_url: Option<String>,
}

/// Resolves [`FileMetadata`] for a path.
///
/// Resolution is async and potentially slow (hashing large files); it is
/// the sole suspension point in the entity's lifecycle.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_metadata(
        &self,
        path: &str,
        store_data_url: bool,
    ) -> Result<FileMetadata>;
}

/// [`MetadataProvider`] backed by the local filesystem.
#[derive(Debug, Default)]
pub struct FsMetadataProvider;

#[async_trait]
impl MetadataProvider for FsMetadataProvider {
    async fn get_metadata(
        &self,
        path: &str,
        store_data_url: bool,
    ) -> Result<FileMetadata> {
        log::debug!("Resolving metadata for: {}", path);

        let normalized = storage::normalize(path);
        let (dir, name, ext) = storage::split(&normalized);
        let mimetype = mime_guess::from_path(&normalized)
            .first_raw()
            .map(str::to_string);

        let stat = match tokio::fs::metadata(&normalized).await {
            Ok(stat) => stat,
            Err(e) => {
                log::trace!(
                    "Stat of {} failed ({}), treating as missing",
                    normalized,
                    e
                );
                return Ok(FileMetadata {
                    name,
                    ext,
                    dir,
                    mimetype,
                    size: -1,
                    exists: false,
                    hash: None,
                    birthtime: None,
                    data_url: None,
                });
            }
        };

        let size = stat.len() as i64;
        let birthtime = stat
            .created()
            .or_else(|_| stat.modified())
            .ok();

        // Hashing and content capture are blocking reads, kept off the
        // async executor
        let hash_path = normalized.clone();
        let url_mime = mimetype
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let (hash, data_url) = tokio::task::spawn_blocking(
            move || -> Result<(String, Option<String>)> {
                let hash = hash_file(Path::new(&hash_path))?;
                let data_url = if store_data_url {
                    let content = fs::read(&hash_path)?;
                    Some(storage::encode_data_url(&url_mime, &content))
                } else {
                    None
                };
                Ok((hash, data_url))
            },
        )
        .await
        .map_err(|e| {
            FileError::Other(anyhow::anyhow!("metadata task panicked: {}", e))
        })??;

        Ok(FileMetadata {
            name,
            ext,
            dir,
            mimetype,
            size,
            exists: true,
            hash: Some(hash),
            birthtime,
            data_url,
        })
    }
}

/// Buffered CRC32 digest of a file, rendered as lowercase hex.
fn hash_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
    let mut hasher = crc32fast::Hasher::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
        let consumed = chunk.len();
        reader.consume(consumed);
    }
    Ok(format!("{:08x}", hasher.finalize()))
}
