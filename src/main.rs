use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use dakara_player::config::{create_config, Config};
use dakara_player::font_loader::{font_loader_for_platform, FontLoader};
use dakara_player::logging::init_logging;
use dakara_player::{create_backend, BackendKind, PlayerController, PlaylistEntry, Runner};

#[derive(Debug, Parser)]
#[command(name = "dakara-play", version, about = "Karaoke player for Dakara")]
struct Cli {
    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Configuration file to use instead of the default one
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play songs (default)
    Play(PlayArgs),
    /// Create a default configuration file
    CreateConfig(CreateConfigArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct PlayArgs {
    /// JSON file holding a list of playlist entries
    #[arg(long, value_name = "JSON")]
    playlist: Option<PathBuf>,

    /// Backend overriding the configured one
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Song files, relative to the kara folder
    #[arg(value_name = "SONG")]
    songs: Vec<PathBuf>,
}

impl PlayArgs {
    async fn run(self, debug: bool, config_path: Option<PathBuf>) -> anyhow::Result<()> {
        let mut config = Config::load(config_path.as_deref()).context("Unable to load the configuration")?;
        if let Some(backend) = self.backend {
            config.player.backend = backend;
        }
        config.validate().context("Invalid configuration")?;

        let _guard = init_logging(debug, &config.loglevel);
        info!("Dakara player {}", env!("CARGO_PKG_VERSION"));

        let entries = self.entries()?;

        // the Windows loader waits for the user on the terminal
        let fonts = tokio::task::spawn_blocking(load_fonts).await?;

        let backend = create_backend(&config);
        let controller = PlayerController::new(config, backend)?;
        let result = play(&controller, entries).await;

        if let Err(e) = controller.shutdown().await {
            warn!("Unable to stop the player: {}", e);
        }
        if let Some(mut fonts) = fonts {
            fonts.unload();
        }

        result
    }

    fn entries(&self) -> anyhow::Result<Vec<PlaylistEntry>> {
        let mut entries = match &self.playlist {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Unable to read playlist '{}'", path.display()))?;
                serde_json::from_str::<Vec<PlaylistEntry>>(&content)
                    .with_context(|| format!("Invalid playlist '{}'", path.display()))?
            }
            None => Vec::new(),
        };

        let first_id = entries.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
        entries.extend(
            self.songs
                .iter()
                .zip(first_id..)
                .map(|(song, id)| PlaylistEntry::from_file(id, song.clone())),
        );
        Ok(entries)
    }
}

async fn play(controller: &PlayerController, entries: Vec<PlaylistEntry>) -> anyhow::Result<()> {
    controller
        .load()
        .await
        .with_context(|| format!("Unable to start {}", controller.backend_name()))?;

    info!("{} entries to play", entries.len());
    Runner::new(controller.clone(), entries).run().await?;
    Ok(())
}

fn load_fonts() -> Option<Box<dyn FontLoader + Send>> {
    let mut loader = match font_loader_for_platform() {
        Ok(loader) => loader,
        Err(e) => {
            warn!("Fonts not loaded: {}", e);
            return None;
        }
    };

    if let Err(e) = loader.load() {
        warn!("Unable to load fonts: {}", e);
    }
    Some(loader)
}

#[derive(Debug, Clone, Args)]
struct CreateConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

impl CreateConfigArgs {
    fn run(self, debug: bool, config_path: Option<PathBuf>) -> anyhow::Result<()> {
        let _guard = init_logging(debug, "info");
        let path = match config_path {
            Some(path) => path,
            None => Config::config_path()?,
        };

        create_config(&path, self.force).with_context(|| format!("Unable to create '{}'", path.display()))?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Play(PlayArgs::default())) {
        Command::Play(args) => args.run(cli.debug, cli.config).await,
        Command::CreateConfig(args) => args.run(cli.debug, cli.config),
    }
}
