//! mpv JSON IPC messages

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::media::Media;
use crate::player::BackendEvent;
use crate::version::Version;

/// Identifier of the `pause` property observer
pub const PAUSE_OBSERVER_ID: u64 = 1;

/// First mpv version taking an insertion index in `loadfile`
pub fn loadfile_index_version() -> Version {
    Version::new(&[0, 38, 0])
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MpvResponse {
    Event(MpvEvent),
    Response {
        request_id: u64,
        error: Option<String>,
        data: Option<Value>,
    },
    Other(Value),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MpvEvent {
    pub event: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub file_error: Option<String>,
}

pub fn parse_line(line: &str) -> serde_json::Result<MpvResponse> {
    serde_json::from_str(line)
}

pub fn request(request_id: u64, command: &[Value]) -> String {
    let mut line = json!({
        "command": command,
        "request_id": request_id,
    })
    .to_string();
    line.push('\n');
    line
}

/// Number of `loadfile` commands whose `start-file` event has not been seen.
///
/// While it is not zero, the file mpv reports on is about to be replaced.
#[derive(Debug, Clone, Default)]
pub struct PendingLoads(Arc<AtomicUsize>);

impl PendingLoads {
    /// Called before sending a `loadfile`.
    pub fn begin(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Called when a `loadfile` was rejected, as no file starts for it.
    pub fn cancel(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn started(&self) {
        self.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

/// Translates mpv events into backend events.
///
/// Pause changes are only meaningful once a file is loaded, since mpv
/// reports the property when observation starts and between files. Events
/// of a file already replaced by a newer `loadfile` are dropped.
#[derive(Debug, Default)]
pub struct EventTranslator {
    loaded: bool,
    pending: PendingLoads,
}

impl EventTranslator {
    pub fn new(pending: PendingLoads) -> Self {
        Self { loaded: false, pending }
    }

    pub fn translate(&mut self, event: &MpvEvent) -> Option<BackendEvent> {
        if event.event == "start-file" {
            self.pending.started();
            self.loaded = false;
            return None;
        }

        if self.pending.is_pending() {
            self.loaded = false;
            return None;
        }

        match event.event.as_str() {
            "file-loaded" => {
                self.loaded = true;
                Some(BackendEvent::Playing)
            }
            "property-change" if event.name.as_deref() == Some("pause") && self.loaded => {
                match event.data.as_ref().and_then(Value::as_bool) {
                    Some(true) => Some(BackendEvent::Paused),
                    Some(false) => Some(BackendEvent::Playing),
                    None => None,
                }
            }
            "end-file" => {
                self.loaded = false;
                match event.reason.as_deref() {
                    Some("eof") => Some(BackendEvent::EndReached),
                    Some("error") => Some(BackendEvent::Error {
                        message: event
                            .file_error
                            .clone()
                            .unwrap_or_else(|| "unknown error".to_string()),
                    }),
                    // "stop" when a file replaces another, "quit" on exit
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Quote a value with mpv's `%len%value` syntax.
pub fn escape_value(value: &str) -> String {
    format!("%{}%{}", value.len(), value)
}

/// Per-file options of a media.
pub fn media_options(media: &Media) -> Vec<(String, String)> {
    let mut options = vec![("pause".to_string(), "no".to_string())];

    if let Some(duration) = media.display_duration {
        options.push((
            "image-display-duration".to_string(),
            duration.as_secs_f64().to_string(),
        ));
    }
    if let Some(subtitle) = &media.subtitle {
        options.push(("sub-files".to_string(), subtitle.display().to_string()));
    }
    if let Some(audio_file) = &media.audio_file {
        options.push(("audio-files".to_string(), audio_file.display().to_string()));
    }
    for option in &media.options {
        let (name, value) = option.split_once('=').unwrap_or((option.as_str(), "yes"));
        options.push((name.to_string(), value.to_string()));
    }

    options
}

/// `loadfile` command replacing the current file.
pub fn loadfile_command(path: &Path, options: &[(String, String)], version: &Version) -> Vec<Value> {
    let mut command = vec![
        json!("loadfile"),
        json!(path.display().to_string()),
        json!("replace"),
    ];

    if *version >= loadfile_index_version() {
        command.push(json!(-1));
    }

    let options = options
        .iter()
        .map(|(name, value)| format!("{}={}", name, escape_value(value)))
        .collect::<Vec<_>>()
        .join(",");
    command.push(json!(options));

    command
}

/// Version from `mpv --version` or the `mpv-version` property.
pub fn parse_version(output: &str) -> Option<Version> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("mpv "))
        .find_map(|rest| rest.split_whitespace().next().and_then(Version::parse))
}

/// Audio track identifiers of a `track-list` property value.
pub fn audio_track_ids(track_list: &Value) -> Vec<i64> {
    track_list
        .as_array()
        .map(|tracks| {
            tracks
                .iter()
                .filter(|track| track.get("type").and_then(Value::as_str) == Some("audio"))
                .filter_map(|track| track.get("id").and_then(Value::as_i64))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn event(line: &str) -> MpvEvent {
        match parse_line(line).unwrap() {
            MpvResponse::Event(event) => event,
            other => panic!("not an event: {:?}", other),
        }
    }

    #[test]
    fn parses_responses_and_events() {
        assert_eq!(
            parse_line(r#"{"request_id": 3, "error": "success", "data": 1.5}"#).unwrap(),
            MpvResponse::Response {
                request_id: 3,
                error: Some("success".into()),
                data: Some(json!(1.5)),
            }
        );
        assert_eq!(event(r#"{"event": "file-loaded"}"#).event, "file-loaded");
        assert!(matches!(parse_line(r#"[1, 2]"#).unwrap(), MpvResponse::Other(_)));
    }

    #[test]
    fn translates_playback_cycle() {
        let mut translator = EventTranslator::default();

        // initial pause report before any file
        assert_eq!(
            translator.translate(&event(
                r#"{"event": "property-change", "id": 1, "name": "pause", "data": false}"#
            )),
            None
        );
        assert_eq!(translator.translate(&event(r#"{"event": "start-file"}"#)), None);
        assert_eq!(
            translator.translate(&event(r#"{"event": "file-loaded"}"#)),
            Some(BackendEvent::Playing)
        );
        assert_eq!(
            translator.translate(&event(
                r#"{"event": "property-change", "id": 1, "name": "pause", "data": true}"#
            )),
            Some(BackendEvent::Paused)
        );
        assert_eq!(
            translator.translate(&event(
                r#"{"event": "property-change", "id": 1, "name": "pause", "data": false}"#
            )),
            Some(BackendEvent::Playing)
        );
        assert_eq!(
            translator.translate(&event(r#"{"event": "end-file", "reason": "eof"}"#)),
            Some(BackendEvent::EndReached)
        );
    }

    #[test]
    fn translates_end_reasons() {
        let mut translator = EventTranslator::default();
        assert_eq!(
            translator.translate(&event(r#"{"event": "end-file", "reason": "stop"}"#)),
            None
        );
        assert_eq!(
            translator.translate(&event(
                r#"{"event": "end-file", "reason": "error", "file_error": "unrecognized file format"}"#
            )),
            Some(BackendEvent::Error {
                message: "unrecognized file format".into()
            })
        );
    }

    #[test]
    fn events_of_replaced_file_are_dropped() {
        let pending = PendingLoads::default();
        let mut translator = EventTranslator::new(pending.clone());

        // idle image replaced by the transition before mpv reported anything
        pending.begin();
        pending.begin();
        let translated: Vec<_> = [
            r#"{"event": "start-file", "playlist_entry_id": 1}"#,
            r#"{"event": "file-loaded"}"#,
            r#"{"event": "property-change", "id": 1, "name": "pause", "data": false}"#,
            r#"{"event": "end-file", "reason": "stop"}"#,
            r#"{"event": "start-file", "playlist_entry_id": 2}"#,
            r#"{"event": "file-loaded"}"#,
        ]
        .iter()
        .filter_map(|line| translator.translate(&event(line)))
        .collect();

        assert_eq!(translated, vec![BackendEvent::Playing]);
        assert!(!pending.is_pending());
    }

    #[test]
    fn rejected_load_is_not_waited_for() {
        let pending = PendingLoads::default();
        let mut translator = EventTranslator::new(pending.clone());

        pending.begin();
        pending.cancel();
        pending.cancel();
        assert!(!pending.is_pending());
        assert_eq!(
            translator.translate(&event(r#"{"event": "end-file", "reason": "eof"}"#)),
            Some(BackendEvent::EndReached)
        );
    }

    #[test]
    fn escapes_by_byte_length() {
        assert_eq!(escape_value("a,b"), "%3%a,b");
        assert_eq!(escape_value("é"), "%2%é");
    }

    #[test]
    fn loadfile_framing_depends_on_version() {
        let media = Media::new("/bg/idle.png")
            .with_subtitle("/tmp/idle.ass")
            .with_display_duration(Duration::from_secs(20));
        let options = media_options(&media);

        let old = loadfile_command(&media.path, &options, &Version::new(&[0, 37, 0]));
        assert_eq!(
            old,
            vec![
                json!("loadfile"),
                json!("/bg/idle.png"),
                json!("replace"),
                json!("pause=%2%no,image-display-duration=%2%20,sub-files=%13%/tmp/idle.ass"),
            ]
        );

        let new = loadfile_command(&media.path, &options, &Version::new(&[0, 38, 0]));
        assert_eq!(new[3], json!(-1));
        assert_eq!(new.len(), 5);
    }

    #[test]
    fn media_options_include_audio_and_extra() {
        let media = Media::new(PathBuf::from("song.mkv"))
            .with_audio_file("song.ogg")
            .with_options(vec!["volume=50".to_string(), "mute".to_string()]);

        assert_eq!(
            media_options(&media),
            vec![
                ("pause".to_string(), "no".to_string()),
                ("audio-files".to_string(), "song.ogg".to_string()),
                ("volume".to_string(), "50".to_string()),
                ("mute".to_string(), "yes".to_string()),
            ]
        );
    }

    #[test]
    fn parses_versions() {
        assert_eq!(
            parse_version("mpv 0.32.0 Copyright © 2000-2020 mpv/MPlayer/mplayer2 projects\n built on ..."),
            Some(Version::new(&[0, 32, 0]))
        );
        assert_eq!(
            parse_version("mpv v0.38.0-386-g1bfae45 Copyright"),
            Some(Version::new(&[0, 38, 0]))
        );
        assert_eq!(parse_version("something else"), None);
    }

    #[test]
    fn audio_tracks_from_track_list() {
        let tracks = json!([
            {"id": 1, "type": "video"},
            {"id": 1, "type": "audio"},
            {"id": 2, "type": "audio"},
            {"id": 1, "type": "sub"}
        ]);
        assert_eq!(audio_track_ids(&tracks), vec![1, 2]);
    }
}
