//! VLC remote control ("rc") interface
//!
//! The rc interface is line based and has no request framing. Each command
//! is followed by an unknown sentinel command: VLC answers it with an
//! "Unknown command" line, which marks the end of the real response.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::error::{PlayerError, Result};
use crate::mrl::mrl_to_path;
use crate::player::BackendEvent;

const BACKEND: &str = "VLC";
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const UNKNOWN_COMMAND: &str = "Unknown command";
const SENTINEL_PREFIX: &str = "dakara-sync-";

/// Time given to a loaded media to start playing
pub const START_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RcClient {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    counter: u64,
}

impl RcClient {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(BufReader::new(reader)),
            writer: Box::new(writer),
            counter: 0,
        }
    }

    /// Send a command and collect its response lines.
    pub async fn command(&mut self, command: &str) -> Result<Vec<String>> {
        self.counter += 1;
        let sentinel = format!("{}{}", SENTINEL_PREFIX, self.counter);

        trace!("VLC -> {}", command);
        let payload = format!("{}\n{}\n", command, sentinel);
        self.writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| PlayerError::unavailable(BACKEND, format!("rc write error: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| PlayerError::unavailable(BACKEND, format!("rc write error: {}", e)))?;

        let mut response = Vec::new();
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .map_err(|_| {
                    PlayerError::unavailable(BACKEND, format!("no reply to '{}' within {:?}", command, REPLY_TIMEOUT))
                })?
                .map_err(|e| PlayerError::unavailable(BACKEND, format!("rc read error: {}", e)))?;
            if read == 0 {
                return Err(PlayerError::unavailable(BACKEND, "rc connection lost"));
            }

            let line = strip_prompt(&line);
            trace!("VLC <- {}", line);
            if is_sentinel_reply(line, &sentinel) {
                break;
            }
            if line.contains(SENTINEL_PREFIX) {
                // late reply to an earlier sentinel
                continue;
            }
            if !line.is_empty() {
                response.push(line.to_string());
            }
        }

        if let Some(line) = response.iter().find(|line| line.contains(UNKNOWN_COMMAND)) {
            return Err(PlayerError::protocol(BACKEND, line.clone()));
        }

        Ok(response)
    }
}

fn strip_prompt(line: &str) -> &str {
    let mut line = line.trim_end_matches(['\r', '\n']);
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.trim_start();
    }
    line.trim()
}

fn is_sentinel_reply(line: &str, sentinel: &str) -> bool {
    if !line.contains(UNKNOWN_COMMAND) {
        return false;
    }
    line.match_indices(sentinel).any(|(index, _)| {
        !line[index + sentinel.len()..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcState {
    Opening,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
    Other,
}

impl RcState {
    fn parse(state: &str) -> Self {
        match state {
            "opening" | "buffering" => RcState::Opening,
            "playing" => RcState::Playing,
            "paused" => RcState::Paused,
            "stopped" => RcState::Stopped,
            "ended" => RcState::Ended,
            "error" => RcState::Error,
            _ => RcState::Other,
        }
    }
}

/// Output of the `status` command.
#[derive(Debug, Clone, PartialEq)]
pub struct RcStatus {
    pub input: Option<String>,
    pub state: RcState,
}

impl RcStatus {
    pub fn parse(lines: &[String]) -> Self {
        let mut status = RcStatus {
            input: None,
            state: RcState::Stopped,
        };

        for line in lines {
            let Some(inner) = line
                .trim()
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
            else {
                continue;
            };
            let inner = inner.trim();

            if let Some(input) = inner.strip_prefix("new input:") {
                status.input = Some(input.trim().to_string());
            } else if let Some(state) = inner.strip_prefix("state ") {
                status.state = RcState::parse(state.trim());
            }
        }

        status
    }
}

/// First integer of a response, as given by `get_time`.
pub fn parse_integer(lines: &[String]) -> Option<i64> {
    lines.iter().find_map(|line| line.trim().parse::<i64>().ok())
}

/// Track identifiers of an `atrack` listing, without the "Disable" entry.
///
/// ```text
/// +----[ Audio Track ]
/// | -1 - Disable
/// | 1 - Track 1 - [English]
/// | 2 - Track 2 *
/// +----[ end of Audio Track ]
/// ```
pub fn parse_tracks(lines: &[String]) -> Vec<i64> {
    lines
        .iter()
        .filter_map(|line| line.trim().strip_prefix('|'))
        .filter_map(|entry| entry.trim().split(" - ").next())
        .filter_map(|id| id.trim().parse::<i64>().ok())
        .filter(|id| *id >= 0)
        .collect()
}

/// Quote an rc argument containing spaces.
pub fn quote(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Playback tracking of the rc status.
///
/// The rc interface reports no events, so they are derived by comparing
/// successive `status` outputs against the media that was last loaded.
#[derive(Debug, Default)]
pub struct VlcWatch {
    expected: Option<String>,
    started: bool,
    paused: bool,
    since: Option<Instant>,
}

impl VlcWatch {
    /// Track a newly loaded media.
    pub fn expect(&mut self, mrl: String, now: Instant) {
        self.expected = Some(mrl);
        self.started = false;
        self.paused = false;
        self.since = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_playing(&self) -> bool {
        self.started && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.started && self.paused
    }

    pub fn observe(&mut self, status: &RcStatus, now: Instant) -> Option<BackendEvent> {
        let expected = self.expected.clone()?;

        if !self.started {
            let current = status
                .input
                .as_deref()
                .map(|input| same_media(input, &expected))
                .unwrap_or(false);

            if current && status.state == RcState::Playing {
                self.started = true;
                return Some(BackendEvent::Playing);
            }
            if current && status.state == RcState::Error {
                self.clear();
                return Some(BackendEvent::Error {
                    message: format!("VLC could not play '{}'", expected),
                });
            }
            if self.since.map(|since| now - since > START_TIMEOUT).unwrap_or(false) {
                self.clear();
                return Some(BackendEvent::Error {
                    message: format!("'{}' did not start in time", expected),
                });
            }
            return None;
        }

        match status.state {
            RcState::Playing if self.paused => {
                self.paused = false;
                Some(BackendEvent::Playing)
            }
            RcState::Paused if !self.paused => {
                self.paused = true;
                Some(BackendEvent::Paused)
            }
            RcState::Stopped | RcState::Ended => {
                self.clear();
                Some(BackendEvent::EndReached)
            }
            RcState::Error => {
                self.clear();
                Some(BackendEvent::Error {
                    message: format!("VLC could not play '{}'", expected),
                })
            }
            _ => None,
        }
    }
}

/// Compare an input reported by VLC with a loaded MRL.
fn same_media(input: &str, mrl: &str) -> bool {
    if input == mrl {
        return true;
    }
    match (mrl_to_path(input), mrl_to_path(mrl)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
