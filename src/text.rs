//! On-screen text of the idle and transition screens
//!
//! Texts are ASS subtitle files rendered from templates and written to a
//! temporary directory, so that the native player can display them over the
//! background image.

use std::fs;
use std::path::PathBuf;

use minijinja::{context, Environment};
use serde::Serialize;
use tracing::debug;

use crate::config::TemplatesConfig;
use crate::error::{PlayerError, Result};
use crate::media::Screen;
use crate::playlist::PlaylistEntry;
use crate::resources::resolve_with_fallback;

pub const IDLE_TEMPLATE_NAME: &str = "idle.ass";
pub const TRANSITION_TEMPLATE_NAME: &str = "transition.ass";

const IDLE_TEXT_NAME: &str = "idle.ass";
const TRANSITION_TEXT_NAME: &str = "transition.ass";

/// Arguments of the text of a screen.
#[derive(Debug, Clone)]
pub enum TextArguments<'a> {
    Idle { notes: &'a [String] },
    Transition { entry: &'a PlaylistEntry },
}

#[derive(Serialize)]
struct TransitionContext<'a> {
    title: &'a str,
    artists: Vec<&'a str>,
    works: Vec<String>,
    owner: Option<&'a str>,
}

impl<'a> TransitionContext<'a> {
    fn from_entry(entry: &'a PlaylistEntry) -> Self {
        let works = entry
            .song
            .works
            .iter()
            .map(|song_work| {
                let mut text = song_work.work.title.clone();
                if let Some(subtitle) = &song_work.work.subtitle {
                    text.push_str(&format!(" ~{}~", subtitle));
                }
                if let Some(link_type) = &song_work.link_type {
                    text.push_str(&format!(" {}", link_type));
                    if let Some(number) = song_work.link_type_number {
                        text.push_str(&number.to_string());
                    }
                }
                text
            })
            .collect();

        Self {
            title: &entry.song.title,
            artists: entry.song.artists.iter().map(|a| a.name.as_str()).collect(),
            works,
            owner: entry.owner.as_ref().map(|owner| owner.name()),
        }
    }
}

pub struct TextGenerator {
    environment: Environment<'static>,
    config: TemplatesConfig,
    default_directory: PathBuf,
    output_directory: PathBuf,
}

impl TextGenerator {
    pub fn new(config: TemplatesConfig, default_directory: PathBuf, output_directory: PathBuf) -> Self {
        Self {
            environment: Environment::new(),
            config,
            default_directory,
            output_directory,
        }
    }

    /// Resolve and compile the templates.
    pub fn load(&mut self) -> Result<()> {
        let idle = self.resolve(
            "idle",
            self.config.idle_template_name.as_deref(),
            IDLE_TEMPLATE_NAME,
        )?;
        let transition = self.resolve(
            "transition",
            self.config.transition_template_name.as_deref(),
            TRANSITION_TEMPLATE_NAME,
        )?;

        for (name, path) in [("idle", idle), ("transition", transition)] {
            debug!("Loading {} template from '{}'", name, path.display());
            let source = fs::read_to_string(&path)?;
            self.environment.add_template_owned(name, source)?;
        }

        Ok(())
    }

    fn resolve(&self, name: &str, filename: Option<&str>, default_filename: &str) -> Result<PathBuf> {
        resolve_with_fallback(
            self.config.directory.as_deref(),
            filename,
            &self.default_directory,
            default_filename,
        )
        .ok_or_else(|| PlayerError::TemplateNotFound(name.to_string()))
    }

    /// Render the idle screen text and return the path of the written file.
    pub fn create_idle_text(&self, notes: &[String]) -> Result<PathBuf> {
        let text = self
            .environment
            .get_template("idle")?
            .render(context! { notes => notes })?;
        self.write(IDLE_TEXT_NAME, &text)
    }

    /// Render the transition screen text and return the path of the written file.
    pub fn create_transition_text(&self, entry: &PlaylistEntry) -> Result<PathBuf> {
        let text = self
            .environment
            .get_template("transition")?
            .render(context! { playlist_entry => TransitionContext::from_entry(entry) })?;
        self.write(TRANSITION_TEXT_NAME, &text)
    }

    /// Render the text of the given screen.
    pub fn generate(&self, screen: Screen, arguments: TextArguments<'_>) -> Result<PathBuf> {
        match (screen, arguments) {
            (Screen::Idle, TextArguments::Idle { notes }) => self.create_idle_text(notes),
            (Screen::Transition, TextArguments::Transition { entry }) => {
                self.create_transition_text(entry)
            }
            (screen, _) => Err(PlayerError::InvalidState(format!(
                "Unexpected action to generate text to: {}",
                screen
            ))),
        }
    }

    fn write(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.output_directory.join(name);
        fs::write(&path, text)?;
        Ok(path)
    }
}
