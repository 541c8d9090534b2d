use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::{FileError, Result};

/// Synchronous low-level file I/O primitives.
///
/// The default implementation is [`FsStorageDriver`]; tests substitute
/// fakes to observe calls without touching the filesystem.
pub trait StorageDriver: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn unlink(&self, path: &str) -> Result<()>;
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
    fn write_data_url(&self, path: &str, data_url: &str) -> Result<()>;
    fn copy(&self, from: &str, to: &str) -> Result<()>;
}

/// [`StorageDriver`] over `std::fs`.
#[derive(Debug, Default)]
pub struct FsStorageDriver;

impl StorageDriver for FsStorageDriver {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn unlink(&self, path: &str) -> Result<()> {
        log::debug!("Deleting file: {}", path);
        fs::remove_file(path)?;
        Ok(())
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        log::debug!("Writing {} bytes to: {}", data.len(), path);
        fs::write(path, data)?;
        Ok(())
    }

    fn write_data_url(&self, path: &str, data_url: &str) -> Result<()> {
        let data = decode_data_url(data_url)?;
        self.write(path, &data)
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        log::debug!("Copying {} to {}", from, to);
        fs::copy(from, to)?;
        Ok(())
    }
}

/// Normalize a path to the forward-slash form used as entity identity.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join a directory and a file name, forward-slash separated.
pub fn join(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        return file.to_string();
    }
    if dir.ends_with('/') {
        return format!("{}{}", dir, file);
    }
    format!("{}/{}", dir, file)
}

/// Decompose a normalized path into (directory, name, extension).
///
/// The extension is lower-cased and carries no leading dot. A dot-file
/// ("/d/.config") is treated as a name without an extension.
pub fn split(path: &str) -> (String, String, String) {
    let (dir, full_name) = match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path.to_string()),
    };

    let (name, ext) = match full_name.rfind('.') {
        Some(idx) if idx > 0 => (
            full_name[..idx].to_string(),
            full_name[idx + 1..].to_lowercase(),
        ),
        _ => (full_name, String::new()),
    };

    (dir, name, ext)
}

/// Encode raw content as a `data:` URL.
pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Decode the base64 payload of a `data:` URL. Bare base64 input (without
/// the `data:<mime>;base64,` prefix) is accepted as well.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let payload = match data_url.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => data_url,
    };
    let data = STANDARD
        .decode(payload)
        .map_err(FileError::from)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn split_decomposes_an_absolute_path() {
        let (dir, name, ext) = split("/tmp/photos/a.jpg");
        assert_eq!(dir, "/tmp/photos");
        assert_eq!(name, "a");
        assert_eq!(ext, "jpg");
        assert_eq!(join(&dir, &format!("{}.{}", name, ext)), "/tmp/photos/a.jpg");
    }

    #[test]
    fn split_handles_root_dotfile_and_bare_names() {
        assert_eq!(
            split("/a.jpg"),
            ("/".into(), "a".into(), "jpg".into())
        );
        assert_eq!(
            split("/d/.config"),
            ("/d".into(), ".config".into(), "".into())
        );
        assert_eq!(split("notes"), ("".into(), "notes".into(), "".into()));
    }

    #[test]
    fn split_lowercases_the_extension() {
        let (_, _, ext) = split("/d/PHOTO.JPG");
        assert_eq!(ext, "jpg");
    }

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(normalize(r"C:\photos\a.jpg"), "C:/photos/a.jpg");
    }

    #[test]
    fn join_does_not_double_separators() {
        assert_eq!(join("/tmp/", "a.jpg"), "/tmp/a.jpg");
        assert_eq!(join("/", "a.jpg"), "/a.jpg");
        assert_eq!(join("", "a.jpg"), "a.jpg");
    }

    #[test]
    fn data_url_round_trips_through_encode_and_decode() {
        let url = encode_data_url("text/plain", b"hello");
        assert_eq!(url, "data:text/plain;base64,aGVsbG8=");
        assert_eq!(decode_data_url(&url).unwrap(), b"hello");
        // Bare payloads are accepted too
        assert_eq!(decode_data_url("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_data_url("data:text/plain;base64,!!!").is_err());
    }

    #[test]
    fn driver_writes_copies_and_unlinks() {
        let dir = TempDir::new("fs_entity_storage").unwrap();
        let driver = FsStorageDriver;
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        let src = src.to_string_lossy().to_string();
        let dst = dst.to_string_lossy().to_string();

        assert!(!driver.exists(&src));
        driver.write(&src, b"payload").unwrap();
        assert!(driver.exists(&src));

        driver.copy(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"payload");

        driver.unlink(&src).unwrap();
        assert!(!driver.exists(&src));
        assert!(driver.unlink(&src).is_err());
    }

    #[test]
    fn driver_decodes_data_urls_on_write() {
        let dir = TempDir::new("fs_entity_storage").unwrap();
        let driver = FsStorageDriver;
        let path = dir.path().join("out.txt");
        let path = path.to_string_lossy().to_string();

        driver
            .write_data_url(&path, "data:text/plain;base64,aGVsbG8=")
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }
}
