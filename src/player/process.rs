//! Native player process supervision

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::events::{BackendEvent, EventBus};
use crate::error::{PlayerError, Result};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Find the executable of a native player.
///
/// A configured path wins. Otherwise the executable directory, the `bin`
/// directory of the crate for development builds, then `PATH` are searched.
pub fn locate_binary(backend: &'static str, custom: Option<&Path>, name: &str) -> Result<PathBuf> {
    if let Some(custom) = custom {
        if custom.is_file() {
            return Ok(custom.to_path_buf());
        }
        if let Ok(path) = which::which(custom) {
            return Ok(path);
        }
        return Err(PlayerError::BinaryNotFound {
            backend,
            name: custom.display().to_string(),
        });
    }

    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join(&file_name);
            if bundled.is_file() {
                debug!("Found {} next to the executable: {:?}", backend, bundled);
                return Ok(bundled);
            }
        }
    }

    #[cfg(debug_assertions)]
    {
        let dev_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("bin").join(&file_name);
        if dev_path.is_file() {
            debug!("Found {} in dev path: {:?}", backend, dev_path);
            return Ok(dev_path);
        }
    }

    which::which(&file_name).map_err(|_| PlayerError::BinaryNotFound {
        backend,
        name: file_name,
    })
}

/// Output of `<binary> --version`, stdout and stderr concatenated.
pub async fn version_output(binary: &Path) -> Result<String> {
    let output = tokio::time::timeout(
        VERSION_TIMEOUT,
        Command::new(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| {
        PlayerError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("'{} --version' did not answer", binary.display()),
        ))
    })??;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Running native player.
///
/// A monitor task owns the child: it logs its stderr, publishes
/// [`BackendEvent::Exited`] if the process dies on its own, and kills it when
/// asked to.
pub struct NativeProcess {
    backend: &'static str,
    kill_tx: watch::Sender<bool>,
    exited_rx: watch::Receiver<bool>,
    stopping: Arc<AtomicBool>,
}

impl NativeProcess {
    pub fn spawn(
        backend: &'static str,
        binary: &Path,
        args: &[String],
        events: EventBus<BackendEvent>,
    ) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Hide console window on Windows (CREATE_NO_WINDOW)
        #[cfg(windows)]
        cmd.creation_flags(0x08000000);

        debug!("Spawning {} {:?}", binary.display(), args);
        let mut child = cmd
            .spawn()
            .map_err(|e| PlayerError::unavailable(backend, format!("failed to spawn: {}", e)))?;
        info!("{} process started (pid {:?})", backend, child.id());

        let (kill_tx, mut kill_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        let stopping = Arc::new(AtomicBool::new(false));

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", backend, line);
                }
            });
        }

        let stopping_flag = stopping.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    if stopping_flag.load(Ordering::SeqCst) {
                        debug!("{} process exited with code {:?}", backend, code);
                    } else {
                        warn!("{} process exited unexpectedly with code {:?}", backend, code);
                        events.publish(BackendEvent::Exited { code });
                    }
                }
                _ = kill_rx.changed() => {
                    info!("Killing {} process", backend);
                    let _ = child.kill().await;
                }
            }
            let _ = exited_tx.send(true);
        });

        Ok(Self {
            backend,
            kill_tx,
            exited_rx,
            stopping,
        })
    }

    pub fn is_running(&self) -> bool {
        !*self.exited_rx.borrow()
    }

    /// Wait for the process to exit, and kill it once `grace` has elapsed.
    pub async fn terminate(&self, grace: Duration) {
        self.stopping.store(true, Ordering::SeqCst);

        if tokio::time::timeout(grace, wait_exited(self.exited_rx.clone()))
            .await
            .is_err()
        {
            warn!("{} did not quit in {:?}, killing it", self.backend, grace);
            let _ = self.kill_tx.send(true);
            wait_exited(self.exited_rx.clone()).await;
        }
    }
}

async fn wait_exited(mut exited: watch::Receiver<bool>) {
    while !*exited.borrow_and_update() {
        if exited.changed().await.is_err() {
            break;
        }
    }
}
