//! Conversions between filesystem paths and media resource locators.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{PlayerError, Result};

/// Convert an absolute path to a `file://` MRL.
pub fn path_to_mrl(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| PlayerError::invalid_media(path, "path is not absolute"))
}

/// Convert a `file://` MRL back to a path.
pub fn mrl_to_path(mrl: &str) -> Result<PathBuf> {
    Url::parse(mrl)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .ok_or_else(|| PlayerError::invalid_media(mrl, "not a local file MRL"))
}
