//! Playlist entries as sent by the Dakara server

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: u64,
    pub song: Song,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub use_instrumental: bool,
}

/// Owner of an entry, either a bare name or a user object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Owner {
    Name(String),
    User { username: String },
}

impl Owner {
    pub fn name(&self) -> &str {
        match self {
            Owner::Name(name) => name,
            Owner::User { username } => username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    /// Path relative to the kara folder
    pub file_path: PathBuf,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub works: Vec<SongWork>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongWork {
    pub work: Work,
    #[serde(default)]
    pub link_type: Option<String>,
    #[serde(default)]
    pub link_type_number: Option<u32>,
    #[serde(default)]
    pub episodes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub work_type: Option<WorkType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkType {
    pub name: String,
}

impl PlaylistEntry {
    /// Entry for a local file, titled after its file name.
    pub fn from_file(id: u64, file_path: PathBuf) -> Self {
        let title = file_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());

        Self {
            id,
            song: Song {
                title,
                file_path,
                artists: Vec::new(),
                works: Vec::new(),
                duration: None,
            },
            owner: None,
            use_instrumental: false,
        }
    }
}
