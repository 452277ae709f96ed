//! Test doubles

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{PlayerError, Result};
use crate::media::Media;
use crate::player::{BackendEvent, BackendKind, EventBus, PlayerBackend};
use crate::version::Version;

/// Backend recording the commands it receives.
pub struct FakeBackend {
    pub events: EventBus<BackendEvent>,
    pub commands: parking_lot::Mutex<Vec<String>>,
    pub version: Version,
    pub load_failures: AtomicUsize,
    /// Loads answered as if the native player did not reply
    pub unreachable_loads: AtomicUsize,
    pub audio_tracks: Vec<i64>,
    pub shutdown_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            events: EventBus::new(),
            commands: parking_lot::Mutex::new(Vec::new()),
            version: Version::new(&[3, 0, 11]),
            load_failures: AtomicUsize::new(0),
            unreachable_loads: AtomicUsize::new(0),
            audio_tracks: vec![1, 2],
            shutdown_delay: Duration::ZERO,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn record(&self, command: impl Into<String>) {
        self.commands.lock().push(command.into());
    }

    pub fn loaded(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("load "))
            .collect()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PlayerBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vlc
    }

    fn minimum_version(&self) -> Version {
        Version::new(&[3, 0, 0])
    }

    async fn version(&self) -> Result<Version> {
        Ok(self.version.clone())
    }

    async fn start(&self) -> Result<()> {
        self.record("start");
        Ok(())
    }

    async fn load(&self, media: &Media) -> Result<()> {
        if take_one(&self.unreachable_loads) {
            self.record("unreachable");
            return Err(PlayerError::unavailable("VLC", "no reply to 'add'"));
        }
        if take_one(&self.load_failures) {
            self.record("load failed");
            return Err(PlayerError::invalid_media(&media.path, "rejected"));
        }
        let name = media
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("load {}", name));
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.record("play");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.record(format!("seek {}", position.as_secs()));
        Ok(())
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        self.record(format!("volume {}", level));
        Ok(())
    }

    async fn timing(&self) -> Result<Duration> {
        Ok(Duration::from_secs(42))
    }

    async fn audio_tracks(&self) -> Result<Vec<i64>> {
        Ok(self.audio_tracks.clone())
    }

    async fn set_audio_track(&self, id: i64) -> Result<()> {
        self.record(format!("atrack {}", id));
        Ok(())
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.record(format!("fullscreen {}", fullscreen));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> Result<()> {
        tokio::time::sleep(self.shutdown_delay).await;
        self.record("shutdown");
        Ok(())
    }
}
