use std::path::{Path, PathBuf};

use crate::errors::Result;

/// An extension filter presented by a save dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Native "save as" prompt.
///
/// Returns the chosen destination, or `None` when the user cancelled.
/// There is no portable native dialog in this crate's dependency set, so
/// applications inject their own implementation; [`NoSaveDialog`] is the
/// default and always cancels.
pub trait SaveDialog: Send + Sync {
    fn prompt(
        &self,
        default_path: &Path,
        filters: &[FileFilter],
    ) -> Option<PathBuf>;
}

/// [`SaveDialog`] that always cancels.
#[derive(Debug, Default)]
pub struct NoSaveDialog;

impl SaveDialog for NoSaveDialog {
    fn prompt(
        &self,
        default_path: &Path,
        _filters: &[FileFilter],
    ) -> Option<PathBuf> {
        log::warn!(
            "No save dialog configured, cancelling save of {:?}",
            default_path
        );
        None
    }
}

/// Opens a path with the OS default handler.
pub trait ShellOpener: Send + Sync {
    fn open(&self, path: &str) -> Result<()>;
}

/// [`ShellOpener`] delegating to the desktop environment.
#[derive(Debug, Default)]
pub struct SystemOpener;

impl ShellOpener for SystemOpener {
    fn open(&self, path: &str) -> Result<()> {
        log::debug!("Opening {} with the default handler", path);
        open::that(path)?;
        Ok(())
    }
}
