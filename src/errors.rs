use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileError>;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The file '{path}' does not exist")]
    Missing { path: String },
    #[error("The file '{path}' is not of type {expected}")]
    WrongType { path: String, expected: String },
    #[error("The file '{path}' is not a valid photo")]
    NotAPhoto { path: String },
    #[error("The photo '{path}' no longer exists")]
    Gone { path: String },
    #[error("Malformed data URL: {0}")]
    DataUrl(String),
    #[error("Watch error: {0}")]
    Watch(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FileError {
    /// Short user-facing title; the `Display` impl carries the detail.
    pub fn title(&self) -> &'static str {
        match self {
            FileError::Missing { .. } | FileError::WrongType { .. } => {
                "Invalid file"
            }
            FileError::NotAPhoto { .. } => "Invalid photo",
            FileError::Gone { .. } => "Photo no longer exists",
            FileError::DataUrl(_) => "Malformed data URL",
            FileError::Watch(_) => "Watch error",
            FileError::Io(_) | FileError::Other(_) => "File error",
        }
    }
}

impl From<notify::Error> for FileError {
    fn from(e: notify::Error) -> Self {
        Self::Watch(e.to_string())
    }
}

impl From<base64::DecodeError> for FileError {
    fn from(e: base64::DecodeError) -> Self {
        Self::DataUrl(e.to_string())
    }
}
