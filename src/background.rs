//! Background images of the idle and transition screens

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PlayerError, Result};
use crate::resources::resolve_with_fallback;

pub const IDLE_BG_NAME: &str = "idle.png";
pub const TRANSITION_BG_NAME: &str = "transition.png";

/// Resolves background files with fallbacks.
///
/// For each background the lookup order is: custom directory with custom
/// name, custom directory with default name, default directory with default
/// name.
#[derive(Debug, Clone)]
pub struct BackgroundLoader {
    directory: Option<PathBuf>,
    default_directory: PathBuf,
    background_filenames: HashMap<String, Option<String>>,
    default_background_filenames: HashMap<String, String>,
    pub backgrounds: HashMap<String, PathBuf>,
}

impl BackgroundLoader {
    pub fn new(
        directory: Option<PathBuf>,
        default_directory: PathBuf,
        background_filenames: HashMap<String, Option<String>>,
        default_background_filenames: HashMap<String, String>,
    ) -> Self {
        Self {
            directory,
            default_directory,
            background_filenames,
            default_background_filenames,
            backgrounds: HashMap::new(),
        }
    }

    /// Loader for the idle and transition screens.
    pub fn for_screens(
        directory: Option<PathBuf>,
        default_directory: PathBuf,
        idle_name: Option<String>,
        transition_name: Option<String>,
    ) -> Self {
        Self::new(
            directory,
            default_directory,
            HashMap::from([
                ("idle".to_string(), idle_name),
                ("transition".to_string(), transition_name),
            ]),
            HashMap::from([
                ("idle".to_string(), IDLE_BG_NAME.to_string()),
                ("transition".to_string(), TRANSITION_BG_NAME.to_string()),
            ]),
        )
    }

    /// Resolve every background.
    pub fn load(&mut self) -> Result<()> {
        let mut backgrounds = HashMap::new();
        for (name, default_filename) in &self.default_background_filenames {
            let filename = self.background_filenames.get(name).cloned().flatten();
            let path = self.resolve(name, filename.as_deref(), default_filename)?;
            debug!("Loading {} background from '{}'", name, path.display());
            backgrounds.insert(name.clone(), path);
        }

        self.backgrounds = backgrounds;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.backgrounds.get(name).map(PathBuf::as_path)
    }

    fn resolve(&self, name: &str, filename: Option<&str>, default_filename: &str) -> Result<PathBuf> {
        resolve_with_fallback(
            self.directory.as_deref(),
            filename,
            &self.default_directory,
            default_filename,
        )
        .ok_or_else(|| PlayerError::BackgroundNotFound(name.to_string()))
    }
}
