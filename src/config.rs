//! Player configuration
//!
//! Loaded from a TOML file in the user configuration directory. Every field
//! has a default so that a partial file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PlayerError, Result};
use crate::player::BackendKind;

/// Default duration of the transition screen
pub const TRANSITION_DURATION: u64 = 10;

/// Default duration of one loop of the idle screen
pub const IDLE_DURATION: u64 = 20;

const CONFIG_DIRECTORY: &str = "dakara";
const CONFIG_FILE: &str = "player.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root directory that song paths are relative to
    pub kara_folder: PathBuf,
    pub fullscreen: bool,
    /// Log level used when `--debug` is not given
    pub loglevel: String,
    pub player: PlayerConfig,
    pub backgrounds: BackgroundsConfig,
    pub templates: TemplatesConfig,
    pub durations: DurationsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kara_folder: dirs::video_dir().unwrap_or_else(|| PathBuf::from(".")),
            fullscreen: false,
            loglevel: "info".to_string(),
            player: PlayerConfig::default(),
            backgrounds: BackgroundsConfig::default(),
            templates: TemplatesConfig::default(),
            durations: DurationsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub backend: BackendKind,
    /// Custom path to the native player executable
    pub path: Option<PathBuf>,
    /// Extra arguments given to the native player process
    pub extra_args: Vec<String>,
    /// Extra options attached to every media
    pub media_options: Vec<String>,
    /// Volume applied once the player has started, between 0 and 100
    pub volume: Option<u8>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Vlc,
            path: None,
            extra_args: Vec::new(),
            media_options: Vec::new(),
            volume: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackgroundsConfig {
    pub directory: Option<PathBuf>,
    pub transition_background_name: Option<String>,
    pub idle_background_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplatesConfig {
    pub directory: Option<PathBuf>,
    pub transition_template_name: Option<String>,
    pub idle_template_name: Option<String>,
}

/// Screen durations in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DurationsConfig {
    pub transition_duration: u64,
    pub idle_duration: u64,
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            transition_duration: TRANSITION_DURATION,
            idle_duration: IDLE_DURATION,
        }
    }
}

impl DurationsConfig {
    pub fn transition(&self) -> Duration {
        Duration::from_secs(self.transition_duration)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_duration)
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| PlayerError::Config("unable to find the configuration directory".into()))?;
        Ok(dir.join(CONFIG_DIRECTORY).join(CONFIG_FILE))
    }

    /// Load the configuration from the given file, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let content = fs::read_to_string(&path).map_err(|e| {
            PlayerError::Config(format!(
                "unable to read '{}' ({}), create it with `dakara-play create-config`",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
            .map_err(|e| PlayerError::Config(format!("invalid file '{}': {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlayerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(volume) = self.player.volume {
            if volume > 100 {
                return Err(PlayerError::InvalidVolume(volume));
            }
        }
        Ok(())
    }
}

/// Write a default configuration file.
///
/// An existing file is kept unless `force` is set. Returns whether the file
/// was written.
pub fn create_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        info!("Config file '{}' already exists, use --force to overwrite it", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, Config::default().to_toml()?)?;
    info!("Config file created in '{}'", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
kara_folder = "/karaoke"

[player]
backend = "mpv"

[durations]
transition_duration = 5
"#,
        )
        .unwrap();

        assert_eq!(config.kara_folder, PathBuf::from("/karaoke"));
        assert_eq!(config.player.backend, BackendKind::Mpv);
        assert_eq!(config.durations.transition_duration, 5);
        assert_eq!(config.durations.idle_duration, IDLE_DURATION);
        assert!(!config.fullscreen);
        assert!(config.backgrounds.directory.is_none());
    }

    #[test]
    fn create_config_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dakara").join("player.toml");

        assert!(create_config(&path, false).unwrap());
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, Config::default());

        fs::write(&path, "fullscreen = true\n").unwrap();
        assert!(!create_config(&path, false).unwrap());
        assert!(Config::load(Some(&path)).unwrap().fullscreen);

        assert!(create_config(&path, true).unwrap());
        assert!(!Config::load(Some(&path)).unwrap().fullscreen);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }

    #[test]
    fn validate_rejects_loud_volume() {
        let mut config = Config::default();
        config.player.volume = Some(150);
        assert!(matches!(config.validate(), Err(PlayerError::InvalidVolume(150))));
    }
}
