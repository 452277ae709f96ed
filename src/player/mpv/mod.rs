//! mpv backend
//!
//! mpv is started idle with a JSON IPC server and driven through it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::process::{locate_binary, version_output, NativeProcess};
use super::{check_volume, BackendEvent, BackendKind, BackendSettings, EventBus, PlayerBackend, QUIT_GRACE};
use crate::error::{PlayerError, Result};
use crate::media::Media;
use crate::version::Version;

pub mod ipc;
pub mod protocol;

use ipc::MpvIpc;

const BACKEND: &str = "mpv";

pub struct MpvBackend {
    settings: BackendSettings,
    events: EventBus<BackendEvent>,
    ipc: Mutex<Option<Arc<MpvIpc>>>,
    process: Mutex<Option<Arc<NativeProcess>>>,
    /// Version of the connected mpv, used for command framing
    version: Mutex<Option<Version>>,
}

impl MpvBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            events: EventBus::new(),
            ipc: Mutex::new(None),
            process: Mutex::new(None),
            version: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus<BackendEvent> {
        &self.events
    }

    fn arguments(&self, socket: &str) -> Vec<String> {
        let mut args = vec![
            "--idle=yes".to_string(),
            format!("--input-ipc-server={}", socket),
            "--force-window=yes".to_string(),
            "--no-terminal".to_string(),
            "--keep-open=no".to_string(),
            "--osd-level=0".to_string(),
            "--no-osc".to_string(),
        ];
        if self.settings.fullscreen {
            args.push("--fullscreen".to_string());
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    /// Connect to an mpv IPC socket and prepare the session.
    pub async fn attach(&self, socket: &str) -> Result<()> {
        let ipc = Arc::new(MpvIpc::connect(socket, self.events.clone()).await?);

        ipc.command(vec![
            json!("observe_property"),
            json!(protocol::PAUSE_OBSERVER_ID),
            json!("pause"),
        ])
        .await?;

        // the running mpv knows its version better than the binary on disk
        let version = ipc
            .get_property("mpv-version")
            .await
            .ok()
            .and_then(|value| value.as_str().and_then(protocol::parse_version));
        if let Some(version) = version {
            debug!("Connected to mpv {}", version);
            *self.version.lock() = Some(version);
        }

        *self.ipc.lock() = Some(ipc);
        Ok(())
    }

    fn ipc(&self) -> Result<Arc<MpvIpc>> {
        if let Some(process) = self.process.lock().as_ref() {
            if !process.is_running() {
                return Err(PlayerError::unavailable(BACKEND, "native process exited"));
            }
        }

        let ipc = self
            .ipc
            .lock()
            .clone()
            .ok_or_else(|| PlayerError::unavailable(BACKEND, "not started"))?;
        if !ipc.is_connected() {
            return Err(PlayerError::unavailable(BACKEND, "IPC connection lost"));
        }
        Ok(ipc)
    }

    fn framing_version(&self) -> Version {
        self.version
            .lock()
            .clone()
            .unwrap_or_else(protocol::loadfile_index_version)
    }
}

#[async_trait]
impl PlayerBackend for MpvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mpv
    }

    fn minimum_version(&self) -> Version {
        Version::new(&[0, 27, 0])
    }

    async fn version(&self) -> Result<Version> {
        if let Some(version) = self.version.lock().clone() {
            return Ok(version);
        }

        let binary = locate_binary(BACKEND, self.settings.binary.as_deref(), BACKEND)?;
        let output = version_output(&binary).await?;
        let version = protocol::parse_version(&output).ok_or(PlayerError::VersionNotFound(BACKEND))?;
        *self.version.lock() = Some(version.clone());
        Ok(version)
    }

    async fn start(&self) -> Result<()> {
        let binary = locate_binary(BACKEND, self.settings.binary.as_deref(), BACKEND)?;
        let socket = ipc::socket_path();
        info!("Starting mpv with IPC socket {}", socket);

        // Clean up a stale socket (Unix only)
        #[cfg(not(target_os = "windows"))]
        let _ = std::fs::remove_file(&socket);

        let process = NativeProcess::spawn(BACKEND, &binary, &self.arguments(&socket), self.events.clone())?;
        *self.process.lock() = Some(Arc::new(process));

        self.attach(&socket).await
    }

    async fn load(&self, media: &Media) -> Result<()> {
        if !media.path.is_file() {
            return Err(PlayerError::invalid_media(&media.path, "file not found"));
        }

        let ipc = self.ipc()?;
        let command = protocol::loadfile_command(
            &media.path,
            &protocol::media_options(media),
            &self.framing_version(),
        );
        debug!("Loading '{}'", media.path.display());

        let loads = ipc.pending_loads();
        loads.begin();
        ipc.command(command).await.map(|_| ()).map_err(|e| {
            loads.cancel();
            match e {
                PlayerError::IpcProtocol { message, .. } => PlayerError::invalid_media(&media.path, message),
                other => other,
            }
        })
    }

    async fn play(&self) -> Result<()> {
        self.ipc()?.set_property("pause", json!(false)).await
    }

    async fn pause(&self) -> Result<()> {
        self.ipc()?.set_property("pause", json!(true)).await
    }

    async fn stop(&self) -> Result<()> {
        self.ipc()?.command(vec![json!("stop")]).await.map(|_| ())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.ipc()?
            .command(vec![
                json!("seek"),
                json!(position.as_secs_f64()),
                json!("absolute"),
            ])
            .await
            .map(|_| ())
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        check_volume(level)?;
        self.ipc()?.set_property("volume", json!(level)).await
    }

    async fn timing(&self) -> Result<Duration> {
        // null while nothing is playing
        match self.ipc()?.get_property("time-pos").await {
            Ok(value) => Ok(Duration::from_secs_f64(value.as_f64().unwrap_or(0.0).max(0.0))),
            Err(PlayerError::IpcProtocol { .. }) => Ok(Duration::ZERO),
            Err(e) => Err(e),
        }
    }

    async fn audio_tracks(&self) -> Result<Vec<i64>> {
        let tracks = self.ipc()?.get_property("track-list").await?;
        Ok(protocol::audio_track_ids(&tracks))
    }

    async fn set_audio_track(&self, id: i64) -> Result<()> {
        self.ipc()?.set_property("aid", json!(id)).await
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.ipc()?.set_property("fullscreen", json!(fullscreen)).await
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> Result<()> {
        let ipc = self.ipc.lock().take();
        if let Some(ipc) = ipc {
            if let Err(e) = ipc.command(vec![Value::from("quit")]).await {
                // mpv may close the socket before answering
                debug!("No reply to quit: {}", e);
            }
        }

        let process = self.process.lock().take();
        if let Some(process) = process {
            process.terminate(QUIT_GRACE).await;
        } else {
            warn!("mpv was not started by this player");
        }

        #[cfg(not(target_os = "windows"))]
        let _ = std::fs::remove_file(ipc::socket_path());

        Ok(())
    }
}
