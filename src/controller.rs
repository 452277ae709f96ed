//! Karaoke flow on top of a backend
//!
//! The controller owns the selected backend for the whole run. It plays the
//! idle screen, then for each playlist entry a transition screen followed by
//! the song, and reports what happens through [`PlayerEvent`]s.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::background::BackgroundLoader;
use crate::config::Config;
use crate::error::{PlayerError, Result};
use crate::media::{find_instrumental_file, Media, Screen};
use crate::player::{check_volume, BackendEvent, EventBus, PlayerBackend};
use crate::playlist::PlaylistEntry;
use crate::resources::{backgrounds_directory, templates_directory};
use crate::text::TextGenerator;
use crate::version::Version;

/// Time after which a slow shutdown is reported
const SHUTDOWN_WARNING_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error,
}

/// What the controller reports to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    StartedTransition { id: u64 },
    StartedSong { id: u64 },
    CouldNotPlay { id: u64 },
    Finished { id: u64 },
    /// `timing` is the position in whole seconds
    Paused { id: u64, timing: u64 },
    Resumed { id: u64, timing: u64 },
    Error { id: Option<u64>, message: String },
    StateChanged { state: PlayerState },
}

/// How the instrumental version of a song is obtained.
#[derive(Debug, Clone, PartialEq)]
enum Instrumental {
    None,
    /// External audio file, added as the last audio track
    File(PathBuf),
    /// Second audio track of the video
    Track,
}

struct Playback {
    state: PlayerState,
    screen: Option<Screen>,
    entry: Option<PlaylistEntry>,
    /// Whether the current screen has started playing
    started: bool,
    song: Option<Media>,
    instrumental: Instrumental,
    /// The native process is gone
    fatal: bool,
    text: TextGenerator,
    backgrounds: BackgroundLoader,
}

struct Inner {
    backend: Arc<dyn PlayerBackend>,
    config: Config,
    events: EventBus<PlayerEvent>,
    playback: Mutex<Playback>,
    version: parking_lot::Mutex<Option<Version>>,
    event_loop: parking_lot::Mutex<Option<JoinHandle<()>>>,
    _text_directory: TempDir,
}

#[derive(Clone)]
pub struct PlayerController {
    inner: Arc<Inner>,
}

impl PlayerController {
    pub fn new(config: Config, backend: Arc<dyn PlayerBackend>) -> Result<Self> {
        let text_directory = tempfile::Builder::new().prefix("dakara-player-").tempdir()?;
        debug!("Created temporary directory '{}'", text_directory.path().display());

        let text = TextGenerator::new(
            config.templates.clone(),
            templates_directory(),
            text_directory.path().to_path_buf(),
        );
        let backgrounds = BackgroundLoader::for_screens(
            config.backgrounds.directory.clone(),
            backgrounds_directory(),
            config.backgrounds.idle_background_name.clone(),
            config.backgrounds.transition_background_name.clone(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                config,
                events: EventBus::new(),
                playback: Mutex::new(Playback {
                    state: PlayerState::Idle,
                    screen: None,
                    entry: None,
                    started: false,
                    song: None,
                    instrumental: Instrumental::None,
                    fatal: false,
                    text,
                    backgrounds,
                }),
                version: parking_lot::Mutex::new(None),
                event_loop: parking_lot::Mutex::new(None),
                _text_directory: text_directory,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    pub fn version(&self) -> Option<Version> {
        self.inner.version.lock().clone()
    }

    pub async fn state(&self) -> PlayerState {
        self.inner.playback.lock().await.state
    }

    pub async fn current_entry(&self) -> Option<PlaylistEntry> {
        self.inner.playback.lock().await.entry.clone()
    }

    /// Whether the native process is gone for good.
    pub async fn is_fatal(&self) -> bool {
        self.inner.playback.lock().await.fatal
    }

    /// Check the environment, then start the backend.
    pub async fn load(&self) -> Result<()> {
        let kara_folder = &self.inner.config.kara_folder;
        if !kara_folder.is_dir() {
            return Err(PlayerError::KaraFolderNotFound(kara_folder.clone()));
        }

        {
            let mut playback = self.inner.playback.lock().await;
            playback.text.load()?;
            playback.backgrounds.load()?;
        }

        let backend = &self.inner.backend;
        let version = backend.check_version().await?;
        info!("{} {}", backend.name(), version);
        *self.inner.version.lock() = Some(version);

        // subscribe before starting so that no event is missed
        let events = backend.subscribe();
        backend.start().await?;
        backend.set_fullscreen(self.inner.config.fullscreen).await?;
        if let Some(volume) = self.inner.config.player.volume {
            backend.set_volume(volume).await?;
        }

        self.spawn_event_loop(events);
        Ok(())
    }

    fn spawn_event_loop(&self, mut events: broadcast::Receiver<BackendEvent>) {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = controller.handle_backend_event(event).await {
                            error!("{}", e);
                            controller.emit(PlayerEvent::Error {
                                id: None,
                                message: e.to_string(),
                            });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!("Missed {} backend events", count);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.inner.event_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    fn emit(&self, event: PlayerEvent) {
        self.inner.events.publish(event);
    }

    fn set_state(&self, playback: &mut Playback, state: PlayerState) {
        if playback.state != state {
            debug!("Player state: {:?} -> {:?}", playback.state, state);
            playback.state = state;
            self.emit(PlayerEvent::StateChanged { state });
        }
    }

    fn ensure_available(&self, playback: &Playback) -> Result<()> {
        if playback.fatal {
            return Err(PlayerError::unavailable(
                self.inner.backend.name(),
                "native process exited",
            ));
        }
        Ok(())
    }

    /// Load a media, retrying once if it is rejected.
    async fn load_media(&self, playback: &mut Playback, media: &Media) -> Result<()> {
        let backend = &self.inner.backend;
        let result = match backend.load(media).await {
            Err(PlayerError::InvalidMedia { reason, .. }) => {
                warn!("Unable to load '{}' ({}), retrying", media.path.display(), reason);
                backend.load(media).await
            }
            other => other,
        };

        // fatal is only latched by Exited
        if let Err(e) = &result {
            if e.is_unavailable() {
                self.set_state(playback, PlayerState::Error);
            }
        }
        result
    }

    fn idle_notes(&self) -> Vec<String> {
        let backend_note = match self.version() {
            Some(version) => format!("{} {}", self.inner.backend.name(), version),
            None => self.inner.backend.name().to_string(),
        };
        vec![
            backend_note,
            format!("Dakara player {}", env!("CARGO_PKG_VERSION")),
        ]
    }

    pub async fn play_idle_screen(&self) -> Result<()> {
        let mut playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;
        self.play_idle(&mut playback).await
    }

    async fn play_idle(&self, playback: &mut Playback) -> Result<()> {
        playback.entry = None;
        playback.song = None;
        playback.instrumental = Instrumental::None;
        playback.started = false;
        playback.screen = Some(Screen::Idle);

        let text = playback.text.create_idle_text(&self.idle_notes())?;
        let background = playback
            .backgrounds
            .get("idle")
            .ok_or_else(|| PlayerError::BackgroundNotFound("idle".to_string()))?
            .to_path_buf();
        let media = Media::new(background)
            .with_subtitle(text)
            .with_display_duration(self.inner.config.durations.idle());

        debug!("Playing idle screen");
        self.load_media(playback, &media).await?;
        self.set_state(playback, PlayerState::Idle);
        Ok(())
    }

    /// Play the transition screen of an entry, then its song.
    pub async fn set_playlist_entry(&self, entry: PlaylistEntry) -> Result<()> {
        let mut playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;

        let id = entry.id;
        match self.prepare_entry(&mut playback, entry).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if !playback.fatal {
                    playback.entry = None;
                    playback.screen = None;
                }
                self.emit(PlayerEvent::CouldNotPlay { id });
                let message = match &e {
                    PlayerError::InvalidMedia { reason, .. } if reason == "file not found" => {
                        "File not found".to_string()
                    }
                    other => other.to_string(),
                };
                self.emit(PlayerEvent::Error {
                    id: Some(id),
                    message,
                });
                Err(e)
            }
        }
    }

    async fn prepare_entry(&self, playback: &mut Playback, entry: PlaylistEntry) -> Result<()> {
        let path = self.inner.config.kara_folder.join(&entry.song.file_path);
        if !path.is_file() {
            error!("File not found '{}'", path.display());
            return Err(PlayerError::invalid_media(&path, "file not found"));
        }

        let mut song = Media::new(&path).with_options(self.inner.config.player.media_options.clone());
        playback.instrumental = Instrumental::None;
        if entry.use_instrumental {
            match find_instrumental_file(&path) {
                Some(audio) => {
                    info!(
                        "Requesting to play instrumental file '{}' for '{}'",
                        audio.display(),
                        path.display()
                    );
                    song = song.with_audio_file(&audio);
                    playback.instrumental = Instrumental::File(audio);
                }
                None => {
                    info!("Requesting to play instrumental track of '{}'", path.display());
                    playback.instrumental = Instrumental::Track;
                }
            }
        }

        let text = playback.text.create_transition_text(&entry)?;
        let background = playback
            .backgrounds
            .get("transition")
            .ok_or_else(|| PlayerError::BackgroundNotFound("transition".to_string()))?
            .to_path_buf();
        let transition = Media::new(background)
            .with_subtitle(text)
            .with_display_duration(self.inner.config.durations.transition());

        self.load_media(playback, &transition).await?;

        playback.song = Some(song);
        playback.entry = Some(entry);
        playback.screen = Some(Screen::Transition);
        playback.started = false;
        self.set_state(playback, PlayerState::Loading);
        Ok(())
    }

    /// React to an event of the backend.
    pub(crate) async fn handle_backend_event(&self, event: BackendEvent) -> Result<()> {
        let mut playback = self.inner.playback.lock().await;
        debug!("Backend event {:?} on {:?}", event, playback.screen);

        match event {
            BackendEvent::Playing => self.on_playing(&mut playback).await,
            BackendEvent::Paused => self.on_paused(&mut playback).await,
            BackendEvent::EndReached => self.on_end_reached(&mut playback).await,
            BackendEvent::Error { message } => self.on_error(&mut playback, message).await,
            BackendEvent::Exited { code } => {
                error!("{} exited unexpectedly (code {:?})", self.inner.backend.name(), code);
                playback.fatal = true;
                self.set_state(&mut playback, PlayerState::Error);
                self.emit(PlayerEvent::Error {
                    id: playback.entry.as_ref().map(|entry| entry.id),
                    message: format!("{} exited unexpectedly", self.inner.backend.name()),
                });
                Ok(())
            }
        }
    }

    async fn position(&self) -> u64 {
        match self.inner.backend.timing().await {
            Ok(timing) => timing.as_secs(),
            Err(e) => {
                debug!("Unable to get timing: {}", e);
                0
            }
        }
    }

    async fn on_playing(&self, playback: &mut Playback) -> Result<()> {
        let Some(screen) = playback.screen else {
            debug!("Playing event without media");
            return Ok(());
        };

        if screen == Screen::Idle {
            debug!("Playing idle screen");
            return Ok(());
        }

        let Some(entry) = playback.entry.clone() else {
            return Err(PlayerError::InvalidState(format!("no entry for the {} screen", screen)));
        };

        if playback.started {
            let timing = self.position().await;
            self.set_state(playback, PlayerState::Playing);
            self.emit(PlayerEvent::Resumed { id: entry.id, timing });
            return Ok(());
        }

        playback.started = true;
        match screen {
            Screen::Transition => {
                info!("Playing transition for '{}'", entry.song.title);
                self.set_state(playback, PlayerState::Playing);
                self.emit(PlayerEvent::StartedTransition { id: entry.id });
            }
            Screen::Song => {
                self.select_instrumental_track(playback).await;
                let path = self.inner.config.kara_folder.join(&entry.song.file_path);
                info!("Now playing '{}' ('{}')", entry.song.title, path.display());
                self.set_state(playback, PlayerState::Playing);
                self.emit(PlayerEvent::StartedSong { id: entry.id });
            }
            Screen::Idle => {}
        }
        Ok(())
    }

    async fn select_instrumental_track(&self, playback: &Playback) {
        let backend = &self.inner.backend;
        let track = match &playback.instrumental {
            Instrumental::None => return,
            Instrumental::File(_) => backend
                .audio_tracks()
                .await
                .ok()
                .and_then(|tracks| tracks.last().copied()),
            Instrumental::Track => backend
                .audio_tracks()
                .await
                .ok()
                .and_then(|tracks| tracks.get(1).copied()),
        };

        let Some(track) = track else {
            let path = playback
                .song
                .as_ref()
                .map(|song| song.path.display().to_string())
                .unwrap_or_default();
            warn!("Cannot find instrumental file or track for file '{}'", path);
            return;
        };

        info!("Requesting to play audio track {}", track);
        if let Err(e) = backend.set_audio_track(track).await {
            warn!("Unable to select audio track {}: {}", track, e);
        }
    }

    async fn on_paused(&self, playback: &mut Playback) -> Result<()> {
        let id = match (playback.screen, &playback.entry) {
            (Some(Screen::Transition | Screen::Song), Some(entry)) => entry.id,
            _ => {
                debug!("Ignoring pause outside of a song");
                return Ok(());
            }
        };

        let timing = self.position().await;
        self.set_state(playback, PlayerState::Paused);
        self.emit(PlayerEvent::Paused { id, timing });
        Ok(())
    }

    async fn on_end_reached(&self, playback: &mut Playback) -> Result<()> {
        match playback.screen {
            Some(Screen::Transition) => {
                let (Some(song), Some(entry)) = (playback.song.clone(), playback.entry.clone()) else {
                    return Err(PlayerError::InvalidState("no song after the transition".to_string()));
                };

                info!("Will play '{}'", song.path.display());
                match self.load_media(playback, &song).await {
                    Ok(()) => {
                        playback.screen = Some(Screen::Song);
                        playback.started = false;
                        self.set_state(playback, PlayerState::Loading);
                        Ok(())
                    }
                    Err(e) if playback.fatal => Err(e),
                    Err(e) => {
                        error!("Unable to play '{}': {}", song.path.display(), e);
                        self.emit(PlayerEvent::CouldNotPlay { id: entry.id });
                        self.emit(PlayerEvent::Error {
                            id: Some(entry.id),
                            message: "Unable to play current song".to_string(),
                        });
                        self.play_idle(playback).await
                    }
                }
            }
            Some(Screen::Song) => {
                if let Some(entry) = &playback.entry {
                    debug!("Song '{}' finished", entry.song.title);
                    self.emit(PlayerEvent::Finished { id: entry.id });
                }
                self.play_idle(playback).await
            }
            Some(Screen::Idle) => {
                debug!("Replaying idle screen");
                self.play_idle(playback).await
            }
            None => {
                self.set_state(playback, PlayerState::Error);
                Err(PlayerError::InvalidState(
                    "End reached on an undefined state".to_string(),
                ))
            }
        }
    }

    async fn on_error(&self, playback: &mut Playback, message: String) -> Result<()> {
        let Some(entry) = playback.entry.clone() else {
            error!("Unable to play the {:?} screen: {}", playback.screen, message);
            self.set_state(playback, PlayerState::Error);
            self.emit(PlayerEvent::Error { id: None, message });
            return Ok(());
        };

        let path = self.inner.config.kara_folder.join(&entry.song.file_path);
        error!("Unable to play '{}'", path.display());
        error!("{}", message);
        self.emit(PlayerEvent::Error {
            id: Some(entry.id),
            message: "Unable to play current song".to_string(),
        });
        self.skip_to_idle(playback).await
    }

    /// Pause or resume the current song.
    ///
    /// Ignored on the idle screen. State changes are applied once the
    /// backend reports them.
    pub async fn pause(&self, paused: bool) -> Result<()> {
        let playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;

        if matches!(playback.screen, None | Some(Screen::Idle)) {
            debug!("Nothing to pause on the idle screen");
            return Ok(());
        }

        match (paused, playback.state) {
            (true, PlayerState::Paused) => {
                debug!("Player already in pause");
                Ok(())
            }
            (false, PlayerState::Playing) => {
                debug!("Player already playing");
                Ok(())
            }
            (true, _) => {
                info!("Setting pause");
                self.inner.backend.pause().await
            }
            (false, _) => {
                info!("Resuming play");
                self.inner.backend.play().await
            }
        }
    }

    /// Abandon the current entry and go back to the idle screen.
    pub async fn skip(&self) -> Result<()> {
        let mut playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;
        self.skip_to_idle(&mut playback).await
    }

    async fn skip_to_idle(&self, playback: &mut Playback) -> Result<()> {
        if matches!(playback.screen, Some(Screen::Transition | Screen::Song)) {
            if let Some(entry) = &playback.entry {
                info!("Skipped '{}'", entry.song.title);
                self.emit(PlayerEvent::Finished { id: entry.id });
            }
        }

        self.play_idle(playback).await
    }

    pub async fn stop(&self) -> Result<()> {
        let mut playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;

        self.inner.backend.stop().await?;
        playback.screen = None;
        playback.entry = None;
        playback.song = None;
        playback.started = false;
        self.set_state(&mut playback, PlayerState::Stopped);
        Ok(())
    }

    pub async fn seek(&self, position: Duration) -> Result<()> {
        let playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;
        self.inner.backend.seek(position).await
    }

    pub async fn set_volume(&self, level: u8) -> Result<()> {
        check_volume(level)?;
        let playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;
        self.inner.backend.set_volume(level).await
    }

    pub async fn timing(&self) -> Result<Duration> {
        let playback = self.inner.playback.lock().await;
        self.ensure_available(&playback)?;
        self.inner.backend.timing().await
    }

    /// Stop listening to the backend and quit the native player.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.inner.event_loop.lock().take() {
            handle.abort();
        }

        let backend = self.inner.backend.clone();
        let shutdown = backend.shutdown();
        tokio::pin!(shutdown);

        tokio::select! {
            result = &mut shutdown => result,
            _ = tokio::time::sleep(SHUTDOWN_WARNING_DELAY) => {
                warn!("{} takes too long to stop", backend.name());
                shutdown.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::mpv::protocol::{self, EventTranslator, MpvResponse, PendingLoads};
    use crate::playlist::Song;
    use crate::testing::FakeBackend;
    use std::fs;
    use std::sync::atomic::Ordering;

    struct Fixture {
        kara: TempDir,
        backend: Arc<FakeBackend>,
        controller: PlayerController,
        events: broadcast::Receiver<PlayerEvent>,
    }

    impl Fixture {
        /// Events emitted so far, without state changes.
        fn drain(&mut self) -> Vec<PlayerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if !matches!(event, PlayerEvent::StateChanged { .. }) {
                    events.push(event);
                }
            }
            events
        }
    }

    async fn fixture_with(backend: FakeBackend) -> Fixture {
        let kara = TempDir::new().unwrap();
        fs::write(kara.path().join("song.mkv"), b"video").unwrap();

        let mut config = Config::default();
        config.kara_folder = kara.path().to_path_buf();
        config.player.volume = Some(70);

        let backend = Arc::new(backend);
        let controller = PlayerController::new(config, backend.clone()).unwrap();
        controller.load().await.unwrap();
        let events = controller.subscribe();

        Fixture {
            kara,
            backend,
            controller,
            events,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakeBackend::new()).await
    }

    fn entry(id: u64, file: &str) -> PlaylistEntry {
        PlaylistEntry {
            id,
            song: Song {
                title: format!("Song {}", id),
                file_path: PathBuf::from(file),
                artists: Vec::new(),
                works: Vec::new(),
                duration: None,
            },
            owner: None,
            use_instrumental: false,
        }
    }

    #[tokio::test]
    async fn load_starts_backend() {
        let f = fixture().await;
        assert_eq!(f.backend.commands(), vec!["start", "fullscreen false", "volume 70"]);
        assert_eq!(f.controller.version(), Some(Version::new(&[3, 0, 11])));
    }

    #[tokio::test]
    async fn load_rejects_missing_kara_folder() {
        let mut config = Config::default();
        config.kara_folder = PathBuf::from("/nowhere/karaoke");
        let controller = PlayerController::new(config, Arc::new(FakeBackend::new())).unwrap();

        let err = controller.load().await.unwrap_err();
        assert_eq!(err.to_string(), "Karaoke folder \"/nowhere/karaoke\" does not exist");
    }

    #[tokio::test]
    async fn load_rejects_old_version() {
        let kara = TempDir::new().unwrap();
        let mut config = Config::default();
        config.kara_folder = kara.path().to_path_buf();
        let mut backend = FakeBackend::new();
        backend.version = Version::new(&[2, 0, 0]);
        let controller = PlayerController::new(config, Arc::new(backend)).unwrap();

        assert!(matches!(
            controller.load().await,
            Err(PlayerError::VersionTooOld { .. })
        ));
    }

    #[tokio::test]
    async fn full_karaoke_flow() {
        let mut f = fixture().await;
        let c = &f.controller;

        c.play_idle_screen().await.unwrap();
        assert_eq!(c.state().await, PlayerState::Idle);
        c.handle_backend_event(BackendEvent::Playing).await.unwrap();

        c.set_playlist_entry(entry(1, "song.mkv")).await.unwrap();
        assert_eq!(c.state().await, PlayerState::Loading);
        c.handle_backend_event(BackendEvent::Playing).await.unwrap();
        assert_eq!(c.state().await, PlayerState::Playing);

        c.handle_backend_event(BackendEvent::EndReached).await.unwrap();
        c.handle_backend_event(BackendEvent::Playing).await.unwrap();
        c.handle_backend_event(BackendEvent::EndReached).await.unwrap();

        assert_eq!(
            f.drain(),
            vec![
                PlayerEvent::StartedTransition { id: 1 },
                PlayerEvent::StartedSong { id: 1 },
                PlayerEvent::Finished { id: 1 },
            ]
        );
        assert_eq!(
            f.backend.loaded(),
            vec!["load idle.png", "load transition.png", "load song.mkv", "load idle.png"]
        );
        assert_eq!(f.controller.state().await, PlayerState::Idle);
        assert!(f.controller.current_entry().await.is_none());
    }

    #[tokio::test]
    async fn idle_screen_loops() {
        let f = fixture().await;
        f.controller.play_idle_screen().await.unwrap();
        f.controller.handle_backend_event(BackendEvent::EndReached).await.unwrap();
        assert_eq!(f.backend.loaded(), vec!["load idle.png", "load idle.png"]);
    }

    #[tokio::test]
    async fn missing_file_cannot_be_played() {
        let mut f = fixture().await;
        f.controller.play_idle_screen().await.unwrap();

        let err = f.controller.set_playlist_entry(entry(7, "missing.mkv")).await.unwrap_err();
        assert!(matches!(err, PlayerError::InvalidMedia { .. }));
        assert_eq!(
            f.drain(),
            vec![
                PlayerEvent::CouldNotPlay { id: 7 },
                PlayerEvent::Error {
                    id: Some(7),
                    message: "File not found".to_string()
                },
            ]
        );
        assert_eq!(f.backend.loaded(), vec!["load idle.png"]);
    }

    #[tokio::test]
    async fn load_is_retried_once() {
        let backend = FakeBackend::new();
        let f = fixture_with(backend).await;
        f.backend.load_failures.store(1, Ordering::SeqCst);
        f.controller.play_idle_screen().await.unwrap();
        assert_eq!(f.backend.commands()[3..], ["load failed", "load idle.png"]);

        f.backend.load_failures.store(2, Ordering::SeqCst);
        let err = f.controller.play_idle_screen().await.unwrap_err();
        assert!(matches!(err, PlayerError::InvalidMedia { .. }));
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let mut f = fixture().await;
        let c = &f.controller;

        // ignored on idle screen
        c.play_idle_screen().await.unwrap();
        c.pause(true).await.unwrap();
        assert!(!f.backend.commands().contains(&"pause".to_string()));

        c.set_playlist_entry(entry(1, "song.mkv")).await.unwrap();
        c.handle_backend_event(BackendEvent::Playing).await.unwrap();
        c.pause(false).await.unwrap();
        c.pause(true).await.unwrap();
        c.handle_backend_event(BackendEvent::Paused).await.unwrap();
        assert_eq!(c.state().await, PlayerState::Paused);
        c.pause(true).await.unwrap();
        c.pause(false).await.unwrap();
        c.handle_backend_event(BackendEvent::Playing).await.unwrap();

        let commands = f.backend.commands();
        assert_eq!(commands.iter().filter(|c| *c == "pause").count(), 1);
        assert_eq!(commands.iter().filter(|c| *c == "play").count(), 1);
        assert_eq!(
            f.drain(),
            vec![
                PlayerEvent::StartedTransition { id: 1 },
                PlayerEvent::Paused { id: 1, timing: 42 },
                PlayerEvent::Resumed { id: 1, timing: 42 },
            ]
        );
    }

    #[tokio::test]
    async fn skip_finishes_entry() {
        let mut f = fixture().await;
        f.controller.set_playlist_entry(entry(3, "song.mkv")).await.unwrap();
        f.controller.skip().await.unwrap();

        assert_eq!(f.drain(), vec![PlayerEvent::Finished { id: 3 }]);
        assert_eq!(f.backend.loaded().last().unwrap(), "load idle.png");
    }

    #[tokio::test]
    async fn playback_error_goes_back_to_idle() {
        let mut f = fixture().await;
        f.controller.set_playlist_entry(entry(4, "song.mkv")).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::Playing).await.unwrap();
        f.drain();
        f.controller
            .handle_backend_event(BackendEvent::Error {
                message: "broken".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            f.drain(),
            vec![
                PlayerEvent::Error {
                    id: Some(4),
                    message: "Unable to play current song".to_string()
                },
                PlayerEvent::Finished { id: 4 },
            ]
        );
        assert_eq!(f.controller.state().await, PlayerState::Idle);
        assert!(f.controller.current_entry().await.is_none());
    }

    #[tokio::test]
    async fn exited_backend_is_unavailable() {
        let f = fixture().await;
        f.controller
            .handle_backend_event(BackendEvent::Exited { code: Some(1) })
            .await
            .unwrap();

        assert_eq!(f.controller.state().await, PlayerState::Error);
        assert!(f.controller.is_fatal().await);
        assert!(f.controller.play_idle_screen().await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn stale_events_of_replaced_screen_are_ignored() {
        let mut f = fixture().await;
        let pending = PendingLoads::default();
        let mut translator = EventTranslator::new(pending.clone());

        // the transition replaces the idle screen before mpv reports on it
        f.controller.play_idle_screen().await.unwrap();
        pending.begin();
        f.controller.set_playlist_entry(entry(1, "song.mkv")).await.unwrap();
        pending.begin();
        f.drain();

        for line in [
            r#"{"event": "start-file", "playlist_entry_id": 1}"#,
            r#"{"event": "file-loaded"}"#,
            r#"{"event": "end-file", "reason": "stop"}"#,
            r#"{"event": "start-file", "playlist_entry_id": 2}"#,
            r#"{"event": "file-loaded"}"#,
        ] {
            let MpvResponse::Event(event) = protocol::parse_line(line).unwrap() else {
                panic!("not an event: {}", line);
            };
            if let Some(event) = translator.translate(&event) {
                f.controller.handle_backend_event(event).await.unwrap();
            }
        }

        assert_eq!(f.drain(), vec![PlayerEvent::StartedTransition { id: 1 }]);
    }

    #[tokio::test]
    async fn unreachable_backend_is_not_fatal() {
        let f = fixture().await;
        f.backend.unreachable_loads.store(1, Ordering::SeqCst);

        let err = f.controller.play_idle_screen().await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(f.controller.state().await, PlayerState::Error);
        assert!(!f.controller.is_fatal().await);

        f.controller.play_idle_screen().await.unwrap();
        assert_eq!(f.controller.state().await, PlayerState::Idle);
        assert_eq!(f.backend.loaded(), vec!["load idle.png"]);
    }

    #[tokio::test]
    async fn end_without_media_is_invalid_state() {
        let f = fixture().await;
        let err = f
            .controller
            .handle_backend_event(BackendEvent::EndReached)
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::InvalidState(_)));
        assert_eq!(f.controller.state().await, PlayerState::Error);
    }

    #[tokio::test]
    async fn instrumental_file_selects_last_track() {
        let mut backend = FakeBackend::new();
        backend.audio_tracks = vec![1, 2, 3];
        let f = fixture_with(backend).await;
        fs::write(f.kara.path().join("song.ogg"), b"audio").unwrap();

        let mut instrumental = entry(5, "song.mkv");
        instrumental.use_instrumental = true;
        f.controller.set_playlist_entry(instrumental).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::Playing).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::EndReached).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::Playing).await.unwrap();

        assert_eq!(f.backend.commands().last().unwrap(), "atrack 3");
    }

    #[tokio::test]
    async fn instrumental_track_is_second_one() {
        let f = fixture().await;

        let mut instrumental = entry(6, "song.mkv");
        instrumental.use_instrumental = true;
        f.controller.set_playlist_entry(instrumental).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::EndReached).await.unwrap();
        f.controller.handle_backend_event(BackendEvent::Playing).await.unwrap();

        assert_eq!(f.backend.commands().last().unwrap(), "atrack 2");
    }

    #[tokio::test]
    async fn slow_shutdown_still_completes() {
        let mut backend = FakeBackend::new();
        backend.shutdown_delay = Duration::from_millis(3100);
        let f = fixture_with(backend).await;

        f.controller.shutdown().await.unwrap();
        assert_eq!(f.backend.commands().last().unwrap(), "shutdown");
    }

    #[tokio::test]
    async fn volume_above_100_is_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.controller.set_volume(150).await,
            Err(PlayerError::InvalidVolume(150))
        ));
        f.controller.seek(Duration::from_secs(30)).await.unwrap();
        assert_eq!(f.backend.commands().last().unwrap(), "seek 30");
    }
}
