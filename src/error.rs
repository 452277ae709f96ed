//! Error taxonomy shared by the backends and the controller.

use std::path::PathBuf;

use crate::version::Version;

/// Errors raised while driving a native player.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("{backend} is not running or cannot be reached: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },

    #[error("Invalid media '{}': {reason}", path.display())]
    InvalidMedia { path: PathBuf, reason: String },

    #[error("IPC protocol error with {backend}: {message}")]
    IpcProtocol { backend: &'static str, message: String },

    #[error("Unable to find the {backend} executable '{name}'")]
    BinaryNotFound { backend: &'static str, name: String },

    #[error("Unable to get {0} version")]
    VersionNotFound(&'static str),

    #[error("{backend} is too old (found {found}, at least {required} is required)")]
    VersionTooOld {
        backend: &'static str,
        found: Version,
        required: Version,
    },

    #[error("Karaoke folder \"{}\" does not exist", .0.display())]
    KaraFolderNotFound(PathBuf),

    #[error("Unable to find a {0} background")]
    BackgroundNotFound(String),

    #[error("Unable to find a {0} template")]
    TemplateNotFound(String),

    #[error("Unable to render text screen: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Volume must be between 0 and 100, got {0}")]
    InvalidVolume(u8),

    #[error("This operating system ({0}) is not currently supported")]
    UnsupportedPlatform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    pub(crate) fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(backend: &'static str, message: impl Into<String>) -> Self {
        Self::IpcProtocol {
            backend,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_media(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidMedia {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors after which the native process should be considered gone.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
