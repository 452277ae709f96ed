//! Native media player backends
//!
//! A backend drives one native player process (VLC or mpv) and exposes the
//! same asynchronous interface for both.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::error::{PlayerError, Result};
use crate::media::Media;
use crate::version::Version;

pub mod events;
pub mod mpv;
pub mod process;
pub mod vlc;

pub use events::{BackendEvent, EventBus};
pub use mpv::MpvBackend;
pub use vlc::VlcBackend;

/// Time left to the native process to quit before it is killed
pub(crate) const QUIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vlc,
    Mpv,
}

impl BackendKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Vlc => "VLC",
            BackendKind::Mpv => "mpv",
        }
    }

    pub fn default_binary(&self) -> &'static str {
        match self {
            BackendKind::Vlc => "vlc",
            BackendKind::Mpv => "mpv",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How the native process is launched.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub binary: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub fullscreen: bool,
}

impl BackendSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.player.path.clone(),
            extra_args: config.player.extra_args.clone(),
            fullscreen: config.fullscreen,
        }
    }
}

/// Uniform control of a native media player.
///
/// Every command fails with [`PlayerError::BackendUnavailable`] when the
/// native process is not running.
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    fn minimum_version(&self) -> Version;

    /// Version of the native player.
    async fn version(&self) -> Result<Version>;

    /// Read the version and reject a native player older than the minimum.
    async fn check_version(&self) -> Result<Version> {
        let version = self.version().await?;
        let required = self.minimum_version();
        if version < required {
            return Err(PlayerError::VersionTooOld {
                backend: self.name(),
                found: version,
                required,
            });
        }
        Ok(version)
    }

    /// Spawn the native process and connect to it.
    async fn start(&self) -> Result<()>;

    /// Replace the current media and start playing it.
    async fn load(&self, media: &Media) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Go to an absolute position of the current media.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Set the volume, between 0 and 100.
    async fn set_volume(&self, level: u8) -> Result<()>;

    /// Position in the current media.
    async fn timing(&self) -> Result<Duration>;

    /// Identifiers of the audio tracks of the current media.
    async fn audio_tracks(&self) -> Result<Vec<i64>>;

    async fn set_audio_track(&self, id: i64) -> Result<()>;

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;

    /// Quit the native process.
    async fn shutdown(&self) -> Result<()>;

    /// Call `callback` each time a media reaches its end.
    fn on_end(&self, callback: Box<dyn Fn() + Send + Sync>) -> JoinHandle<()> {
        listen(self.subscribe(), move |event| {
            if matches!(event, BackendEvent::EndReached) {
                callback();
            }
        })
    }

    /// Call `callback` with the message of each playback error.
    fn on_error(&self, callback: Box<dyn Fn(&str) + Send + Sync>) -> JoinHandle<()> {
        listen(self.subscribe(), move |event| match event {
            BackendEvent::Error { message } => callback(message),
            BackendEvent::Exited { code } => {
                callback(&format!("native process exited with code {:?}", code))
            }
            _ => {}
        })
    }
}

fn listen<F>(mut events: broadcast::Receiver<BackendEvent>, handler: F) -> JoinHandle<()>
where
    F: Fn(&BackendEvent) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => handler(&event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!("Listener missed {} backend events", count);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub(crate) fn check_volume(level: u8) -> Result<()> {
    if level > 100 {
        return Err(PlayerError::InvalidVolume(level));
    }
    Ok(())
}

/// Backend selected by the configuration.
pub fn create_backend(config: &Config) -> Arc<dyn PlayerBackend> {
    let settings = BackendSettings::from_config(config);
    match config.player.backend {
        BackendKind::Vlc => Arc::new(VlcBackend::new(settings)),
        BackendKind::Mpv => Arc::new(MpvBackend::new(settings)),
    }
}
