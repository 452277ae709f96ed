//! Karaoke player for Dakara
//!
//! Plays an idle screen, then a transition screen and the song for each
//! playlist entry, through VLC or mpv driven as a child process.

pub mod background;
pub mod config;
pub mod controller;
pub mod error;
pub mod font_loader;
pub mod logging;
pub mod media;
pub mod mrl;
pub mod player;
pub mod playlist;
pub mod resources;
pub mod runner;
pub mod text;
pub mod version;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use controller::{PlayerController, PlayerEvent, PlayerState};
pub use error::{PlayerError, Result};
pub use player::{create_backend, BackendKind, PlayerBackend};
pub use playlist::PlaylistEntry;
pub use runner::Runner;
pub use version::Version;
