//! Local playlist runner
//!
//! Feeds a queue of playlist entries to the controller, one after the other,
//! until the queue is empty and the user quits.

use std::collections::VecDeque;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::{PlayerController, PlayerEvent};
use crate::error::{PlayerError, Result};
use crate::playlist::PlaylistEntry;

pub struct Runner {
    controller: PlayerController,
    queue: VecDeque<PlaylistEntry>,
    current: Option<u64>,
    token: CancellationToken,
}

impl Runner {
    pub fn new(controller: PlayerController, entries: Vec<PlaylistEntry>) -> Self {
        Self {
            controller,
            queue: entries.into(),
            current: None,
            token: CancellationToken::new(),
        }
    }

    /// Token stopping the runner when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Play the queue on a loaded controller.
    ///
    /// Returns once cancelled, on Ctrl-C, or when the native player is gone.
    pub async fn run(mut self) -> Result<()> {
        let mut events = self.controller.subscribe();
        self.controller.play_idle_screen().await?;
        self.next().await?;

        let result = loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    debug!("Runner cancelled");
                    break Ok(());
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Quitting...");
                    break Ok(());
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!("Missed {} player events", count);
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                },
            }
        };

        self.token.cancel();
        result
    }

    async fn handle_event(&mut self, event: PlayerEvent) -> Result<()> {
        match event {
            PlayerEvent::StartedTransition { id } => debug!("Transition of entry {} started", id),
            PlayerEvent::StartedSong { id } => debug!("Song of entry {} started", id),
            PlayerEvent::Paused { id, timing } => info!("Entry {} paused at {}s", id, timing),
            PlayerEvent::Resumed { id, timing } => info!("Entry {} resumed at {}s", id, timing),
            PlayerEvent::Finished { id } | PlayerEvent::CouldNotPlay { id } => {
                if self.current == Some(id) {
                    self.next().await?;
                }
            }
            // a failed entry is also reported as finished or not playable
            PlayerEvent::Error { message, .. } => {
                if self.controller.is_fatal().await {
                    return Err(PlayerError::unavailable(self.controller.backend_name(), message));
                }
            }
            PlayerEvent::StateChanged { state } => debug!("Player is {:?}", state),
        }
        Ok(())
    }

    /// Submit the next entry of the queue.
    async fn next(&mut self) -> Result<()> {
        let Some(entry) = self.queue.pop_front() else {
            info!("Playlist is empty, staying on idle screen");
            self.current = None;
            return Ok(());
        };

        let id = entry.id;
        info!("Next entry: '{}'", entry.song.title);
        self.current = Some(id);
        if let Err(e) = self.controller.set_playlist_entry(entry).await {
            if self.controller.is_fatal().await {
                return Err(e);
            }
            // reported as not playable, which advances the queue
            error!("Unable to play entry {}: {}", id, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::player::BackendEvent;
    use crate::testing::FakeBackend;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn plays_queue_in_order_and_skips_missing_files() {
        let kara = TempDir::new().unwrap();
        std::fs::write(kara.path().join("song.mkv"), b"video").unwrap();
        let mut config = Config::default();
        config.kara_folder = kara.path().to_path_buf();

        let backend = Arc::new(FakeBackend::new());
        let controller = PlayerController::new(config, backend.clone()).unwrap();
        controller.load().await.unwrap();
        let mut events = controller.subscribe();

        let runner = Runner::new(
            controller.clone(),
            vec![
                PlaylistEntry::from_file(1, "missing.mkv".into()),
                PlaylistEntry::from_file(2, "song.mkv".into()),
            ],
        );
        let token = runner.cancellation_token();
        let task = tokio::spawn(runner.run());

        // the missing entry is skipped and the next one starts
        wait_until(|| backend.loaded().len() == 2).await;
        assert_eq!(backend.loaded(), vec!["load idle.png", "load transition.png"]);

        backend.events.publish(BackendEvent::Playing);
        backend.events.publish(BackendEvent::EndReached);
        wait_until(|| backend.loaded().len() == 3).await;
        backend.events.publish(BackendEvent::Playing);
        backend.events.publish(BackendEvent::EndReached);

        // empty queue, back to idle
        wait_until(|| backend.loaded().len() == 4).await;
        assert_eq!(backend.loaded()[2..], ["load song.mkv", "load idle.png"]);

        token.cancel();
        task.await.unwrap().unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if !matches!(event, PlayerEvent::StateChanged { .. }) {
                seen.push(event);
            }
        }
        assert_eq!(
            seen,
            vec![
                PlayerEvent::CouldNotPlay { id: 1 },
                PlayerEvent::Error {
                    id: Some(1),
                    message: "File not found".to_string()
                },
                PlayerEvent::StartedTransition { id: 2 },
                PlayerEvent::StartedSong { id: 2 },
                PlayerEvent::Finished { id: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn exited_backend_stops_runner() {
        let kara = TempDir::new().unwrap();
        let mut config = Config::default();
        config.kara_folder = kara.path().to_path_buf();

        let backend = Arc::new(FakeBackend::new());
        let controller = PlayerController::new(config, backend.clone()).unwrap();
        controller.load().await.unwrap();

        let task = tokio::spawn(Runner::new(controller, Vec::new()).run());
        wait_until(|| backend.loaded().len() == 1).await;
        backend.events.publish(BackendEvent::Exited { code: Some(1) });

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_unavailable());
    }
}
