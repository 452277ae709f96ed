//! Media handed to a backend and screens shown by the controller

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Audio file extensions accepted as instrumental tracks
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "flac", "opus", "m4a", "aac", "wav", "wma"];

/// What a backend is asked to load.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Media {
    pub path: PathBuf,
    pub subtitle: Option<PathBuf>,
    /// External audio track played instead of the embedded one
    pub audio_file: Option<PathBuf>,
    /// How long a still image is shown
    pub display_duration: Option<Duration>,
    /// Extra native options, in the `name=value` form
    pub options: Vec<String>,
}

impl Media {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<PathBuf>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_audio_file(mut self, audio_file: impl Into<PathBuf>) -> Self {
        self.audio_file = Some(audio_file.into());
        self
    }

    pub fn with_display_duration(mut self, duration: Duration) -> Self {
        self.display_duration = Some(duration);
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.options.extend(options);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Idle,
    Transition,
    Song,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Idle => write!(f, "idle"),
            Screen::Transition => write!(f, "transition"),
            Screen::Song => write!(f, "song"),
        }
    }
}

/// Find an audio file next to a video sharing its stem.
///
/// Returns the first match in name order, `None` if there is none.
pub fn find_instrumental_file(video: &Path) -> Option<PathBuf> {
    let directory = video.parent()?;
    let stem = video.file_stem()?;

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(directory)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path != video && path.is_file())
        .filter(|path| path.file_stem() == Some(stem))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    candidates.sort();
    candidates.into_iter().next()
}
