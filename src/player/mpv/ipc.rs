//! JSON IPC connection to mpv
//!
//! Commands go through a writer task fed by a channel, replies are matched
//! to their request by `request_id`, and events are translated and published
//! on the backend event bus by the reader task.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use super::protocol::{self, EventTranslator, MpvResponse, PendingLoads};
use crate::error::{PlayerError, Result};
use crate::player::{BackendEvent, EventBus};

const BACKEND: &str = "mpv";
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_ATTEMPTS: usize = 50;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

pub struct MpvIpc {
    tx: mpsc::Sender<String>,
    pending: PendingRequests,
    request_id_counter: AtomicU64,
    connected: Arc<AtomicBool>,
    loads: PendingLoads,
}

/// Path of the IPC socket (named pipe on Windows)
pub fn socket_path() -> String {
    #[cfg(target_os = "windows")]
    {
        format!(r"\\.\pipe\dakara-mpv-{}", std::process::id())
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::temp_dir()
            .join(format!("dakara-mpv-{}.sock", std::process::id()))
            .display()
            .to_string()
    }
}

impl MpvIpc {
    /// Connect to the socket, retrying while mpv creates it.
    pub async fn connect(path: &str, events: EventBus<BackendEvent>) -> Result<Self> {
        debug!("Waiting for mpv socket {}", path);
        for _ in 0..CONNECT_ATTEMPTS {
            #[cfg(target_os = "windows")]
            {
                if let Ok(pipe) = tokio::net::windows::named_pipe::ClientOptions::new().open(path) {
                    return Ok(Self::from_stream(pipe, events));
                }
            }
            #[cfg(not(target_os = "windows"))]
            {
                if let Ok(stream) = tokio::net::UnixStream::connect(Path::new(path)).await {
                    return Ok(Self::from_stream(stream, events));
                }
            }
            tokio::time::sleep(CONNECT_DELAY).await;
        }

        Err(PlayerError::unavailable(BACKEND, "timeout waiting for the IPC socket"))
    }

    pub fn from_stream<S>(stream: S, events: EventBus<BackendEvent>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::channel::<String>(100);
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let loads = PendingLoads::default();

        let reader_pending = pending.clone();
        let reader_connected = connected.clone();
        let reader_loads = loads.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut translator = EventTranslator::new(reader_loads);
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        trace!("mpv <- {}", line);
                        match protocol::parse_line(&line) {
                            Ok(MpvResponse::Event(event)) => {
                                if let Some(event) = translator.translate(&event) {
                                    events.publish(event);
                                }
                            }
                            Ok(MpvResponse::Response {
                                request_id,
                                error,
                                data,
                            }) => {
                                if let Some(tx) = reader_pending.lock().remove(&request_id) {
                                    let result = match error.as_deref() {
                                        None | Some("success") => Ok(data.unwrap_or(Value::Null)),
                                        Some(err) => Err(PlayerError::protocol(BACKEND, err)),
                                    };
                                    let _ = tx.send(result);
                                }
                            }
                            Ok(MpvResponse::Other(_)) => {}
                            Err(e) => warn!("Malformed mpv message '{}': {}", line, e),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("mpv IPC read error: {}", e);
                        break;
                    }
                }
            }

            debug!("mpv IPC connection lost");
            reader_connected.store(false, Ordering::SeqCst);
            // dropping the senders fails every pending request
            reader_pending.lock().clear();
        });

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                trace!("mpv -> {}", msg.trim_end());
                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                    error!("mpv IPC write error: {}", e);
                    break;
                }
            }
        });

        Self {
            tx,
            pending,
            request_id_counter: AtomicU64::new(0),
            connected,
            loads,
        }
    }

    /// Loads in flight, shared with the event translation.
    pub fn pending_loads(&self) -> &PendingLoads {
        &self.loads
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its reply.
    pub async fn command(&self, command: Vec<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(PlayerError::unavailable(BACKEND, "IPC connection lost"));
        }

        let request_id = self.request_id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if self.tx.send(protocol::request(request_id, &command)).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(PlayerError::unavailable(BACKEND, "IPC not connected"));
        }

        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PlayerError::unavailable(BACKEND, "IPC connection lost")),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(PlayerError::unavailable(
                    BACKEND,
                    format!("no reply to {} within {:?}", command_name(&command), REPLY_TIMEOUT),
                ))
            }
        }
    }

    pub async fn get_property(&self, name: &str) -> Result<Value> {
        self.command(vec![Value::from("get_property"), Value::from(name)])
            .await
    }

    pub async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.command(vec![Value::from("set_property"), Value::from(name), value])
            .await
            .map(|_| ())
    }
}

fn command_name(command: &[Value]) -> &str {
    command.first().and_then(Value::as_str).unwrap_or("command")
}
