//! VLC backend
//!
//! VLC runs with its dummy interface and the rc interface listening on a
//! local TCP port. A watcher task polls the playback status and publishes the
//! derived events.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::{locate_binary, version_output, NativeProcess};
use super::{check_volume, BackendEvent, BackendKind, BackendSettings, EventBus, PlayerBackend, QUIT_GRACE};
use crate::error::{PlayerError, Result};
use crate::media::Media;
use crate::mrl::path_to_mrl;
use crate::version::Version;

pub mod rc;

use rc::{RcClient, RcStatus, VlcWatch};

const BACKEND: &str = "VLC";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CONNECT_ATTEMPTS: usize = 50;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

/// Connection and playback tracking, locked together so that a status poll
/// never interleaves with a load.
struct Session {
    client: RcClient,
    watch: VlcWatch,
}

type SharedSession = Arc<tokio::sync::Mutex<Option<Session>>>;

pub struct VlcBackend {
    settings: BackendSettings,
    events: EventBus<BackendEvent>,
    session: SharedSession,
    process: Mutex<Option<Arc<NativeProcess>>>,
    watcher: Mutex<Option<CancellationToken>>,
    version: Mutex<Option<Version>>,
}

impl VlcBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            events: EventBus::new(),
            session: Arc::new(tokio::sync::Mutex::new(None)),
            process: Mutex::new(None),
            watcher: Mutex::new(None),
            version: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus<BackendEvent> {
        &self.events
    }

    fn arguments(&self, address: SocketAddr) -> Vec<String> {
        let mut args = vec![
            "--intf".to_string(),
            "dummy".to_string(),
            "--extraintf".to_string(),
            "rc".to_string(),
            "--rc-host".to_string(),
            address.to_string(),
            "--no-video-title-show".to_string(),
            "--no-osd".to_string(),
        ];
        #[cfg(windows)]
        args.push("--rc-quiet".to_string());
        args.push(if self.settings.fullscreen {
            "--fullscreen".to_string()
        } else {
            "--no-fullscreen".to_string()
        });
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    /// Connect to a listening rc interface and start watching the playback.
    pub async fn attach(&self, address: SocketAddr) -> Result<()> {
        let mut stream = None;
        for _ in 0..CONNECT_ATTEMPTS {
            if let Ok(connected) = TcpStream::connect(address).await {
                stream = Some(connected);
                break;
            }
            tokio::time::sleep(CONNECT_DELAY).await;
        }
        let stream = stream
            .ok_or_else(|| PlayerError::unavailable(BACKEND, format!("timeout connecting to rc on {}", address)))?;
        debug!("Connected to VLC rc on {}", address);

        *self.session.lock().await = Some(Session {
            client: RcClient::new(stream),
            watch: VlcWatch::default(),
        });

        let token = CancellationToken::new();
        if let Some(previous) = self.watcher.lock().replace(token.clone()) {
            previous.cancel();
        }
        tokio::spawn(watch_status(self.session.clone(), self.events.clone(), token));
        Ok(())
    }

    fn check_process(&self) -> Result<()> {
        if let Some(process) = self.process.lock().as_ref() {
            if !process.is_running() {
                return Err(PlayerError::unavailable(BACKEND, "native process exited"));
            }
        }
        Ok(())
    }

    /// Run one rc command.
    async fn command(&self, command: &str) -> Result<Vec<String>> {
        self.check_process()?;
        let mut session = self.session.lock().await;
        let session = session
            .as_mut()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;
        session.client.command(command).await
    }
}

async fn watch_status(session: SharedSession, events: EventBus<BackendEvent>, token: CancellationToken) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let mut guard = session.lock().await;
        let Some(current) = guard.as_mut() else {
            break;
        };

        match current.client.command("status").await {
            Ok(lines) => {
                let status = RcStatus::parse(&lines);
                if let Some(event) = current.watch.observe(&status, Instant::now()) {
                    events.publish(event);
                }
            }
            Err(e) if e.is_unavailable() => {
                debug!("Stop watching VLC status: {}", e);
                break;
            }
            Err(e) => warn!("Unable to get VLC status: {}", e),
        }
    }
}

/// Version from the output of `vlc --version`.
pub fn parse_version(output: &str) -> Option<Version> {
    output.lines().find_map(|line| {
        ["VLC media player ", "VLC version "]
            .iter()
            .find_map(|prefix| line.find(prefix).map(|index| &line[index + prefix.len()..]))
            .and_then(Version::parse)
    })
}

fn load_command(mrl: &str, media: &Media) -> Result<String> {
    let mut command = format!("add {}", mrl);

    if let Some(duration) = media.display_duration {
        command.push_str(&format!(" :image-duration={}", duration.as_secs()));
    }
    if let Some(subtitle) = &media.subtitle {
        command.push_str(&format!(" :sub-file={}", rc::quote(&subtitle.display().to_string())));
    }
    if let Some(audio_file) = &media.audio_file {
        command.push_str(&format!(" :input-slave={}", path_to_mrl(audio_file)?));
    }
    for option in &media.options {
        command.push_str(&format!(" :{}", rc::quote(option)));
    }

    Ok(command)
}

async fn free_local_address() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?)
}

#[async_trait]
impl PlayerBackend for VlcBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vlc
    }

    fn minimum_version(&self) -> Version {
        Version::new(&[3, 0, 0])
    }

    async fn version(&self) -> Result<Version> {
        if let Some(version) = self.version.lock().clone() {
            return Ok(version);
        }

        let binary = locate_binary(BACKEND, self.settings.binary.as_deref(), "vlc")?;
        let output = version_output(&binary).await?;
        let version = parse_version(&output).ok_or(PlayerError::VersionNotFound(BACKEND))?;
        *self.version.lock() = Some(version.clone());
        Ok(version)
    }

    async fn start(&self) -> Result<()> {
        let binary = locate_binary(BACKEND, self.settings.binary.as_deref(), "vlc")?;
        let address = free_local_address().await?;
        info!("Starting VLC with rc interface on {}", address);

        let process = NativeProcess::spawn(BACKEND, &binary, &self.arguments(address), self.events.clone())?;
        *self.process.lock() = Some(Arc::new(process));

        self.attach(address).await
    }

    async fn load(&self, media: &Media) -> Result<()> {
        if !media.path.is_file() {
            return Err(PlayerError::invalid_media(&media.path, "file not found"));
        }
        let mrl = path_to_mrl(&media.path)?;
        let command = load_command(&mrl, media)?;

        self.check_process()?;
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;

        debug!("Loading '{}'", media.path.display());
        session.watch.clear();
        session.client.command("clear").await?;
        session.client.command(&command).await.map_err(|e| match e {
            PlayerError::IpcProtocol { message, .. } => PlayerError::invalid_media(&media.path, message),
            other => other,
        })?;
        session.watch.expect(mrl, Instant::now());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.check_process()?;
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;

        // play on a playing media restarts it
        if session.watch.is_paused() {
            session.client.command("play").await?;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.check_process()?;
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;

        // pause is a toggle
        if session.watch.is_playing() {
            session.client.command("pause").await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.check_process()?;
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;

        session.watch.clear();
        session.client.command("stop").await.map(|_| ())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.command(&format!("seek {}", position.as_secs())).await.map(|_| ())
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        check_volume(level)?;
        let volume = u32::from(level) * 256 / 100;
        self.command(&format!("volume {}", volume)).await.map(|_| ())
    }

    async fn timing(&self) -> Result<Duration> {
        let lines = self.command("get_time").await?;
        let seconds = rc::parse_integer(&lines).unwrap_or(0).max(0);
        Ok(Duration::from_secs(seconds as u64))
    }

    async fn audio_tracks(&self) -> Result<Vec<i64>> {
        let lines = self.command("atrack").await?;
        Ok(rc::parse_tracks(&lines))
    }

    async fn set_audio_track(&self, id: i64) -> Result<()> {
        self.command(&format!("atrack {}", id)).await.map(|_| ())
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        let state = if fullscreen { "on" } else { "off" };
        self.command(&format!("fullscreen {}", state)).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(token) = self.watcher.lock().take() {
            token.cancel();
        }

        if let Some(mut session) = self.session.lock().await.take() {
            // VLC closes the connection without answering
            if let Err(e) = session.client.command("quit").await {
                debug!("No reply to quit: {}", e);
            }
        }

        let process = self.process.lock().take();
        if let Some(process) = process {
            process.terminate(QUIT_GRACE).await;
        } else {
            warn!("VLC was not started by this player");
        }

        Ok(())
    }
}
