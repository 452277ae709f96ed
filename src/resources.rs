//! Bundled resources (backgrounds, templates, fonts)

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

const RESOURCES_DIRECTORY: &str = "resources";

/// Find the resources directory.
///
/// Looks next to the executable first, then in the crate directory for
/// development builds.
pub fn resources_directory() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join(RESOURCES_DIRECTORY);
            if bundled.is_dir() {
                return bundled;
            }
        }
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(RESOURCES_DIRECTORY)
}

pub fn backgrounds_directory() -> PathBuf {
    resources_directory().join("backgrounds")
}

pub fn templates_directory() -> PathBuf {
    resources_directory().join("templates")
}

pub fn fonts_directory() -> PathBuf {
    resources_directory().join("fonts")
}

/// Pick a resource file among a custom directory and a default one.
///
/// Tries the custom directory with the custom name, then the custom directory
/// with the default name, then the default directory with the default name.
pub fn resolve_with_fallback(
    directory: Option<&Path>,
    filename: Option<&str>,
    default_directory: &Path,
    default_filename: &str,
) -> Option<PathBuf> {
    if let Some(directory) = directory {
        if let Some(filename) = filename {
            let custom = directory.join(filename);
            if custom.is_file() {
                return Some(custom);
            }
        }

        let custom_default = directory.join(default_filename);
        if custom_default.is_file() {
            return Some(custom_default);
        }
    }

    Some(default_directory.join(default_filename)).filter(|path| path.is_file())
}

/// List every font file of a directory, recursively.
pub fn get_all_fonts(directory: &Path) -> Vec<PathBuf> {
    let fonts: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
                .unwrap_or(false)
        })
        .collect();

    debug!("Found {} font file(s) in '{}'", fonts.len(), directory.display());
    fonts
}
