//! Make the bundled fonts available to the native player
//!
//! On Linux the fonts are symlinked into the user font directory and removed
//! on unload. On Windows the user is asked to install them manually.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PlayerError, Result};
use crate::resources::{fonts_directory, get_all_fonts};

pub trait FontLoader {
    fn load(&mut self) -> Result<()>;

    fn unload(&mut self);
}

/// Font loader of the running platform.
pub fn font_loader_for_platform() -> Result<Box<dyn FontLoader + Send>> {
    font_loader_for(std::env::consts::OS, fonts_directory())
}

fn font_loader_for(os: &str, fonts: PathBuf) -> Result<Box<dyn FontLoader + Send>> {
    match os {
        #[cfg(unix)]
        "linux" => Ok(Box::new(FontLoaderLinux::new(fonts)?)),
        "windows" => Ok(Box::new(FontLoaderWindows::new(
            fonts,
            io::stdout(),
            io::BufReader::new(io::stdin()),
        ))),
        other => Err(PlayerError::UnsupportedPlatform(other.to_string())),
    }
}

#[cfg(unix)]
pub use linux::FontLoaderLinux;

#[cfg(unix)]
mod linux {
    use std::fs;
    use std::os::unix::fs::symlink;

    use tracing::error;

    use super::*;

    const SYSTEM_FONTS_DIRECTORY: &str = "/usr/share/fonts";
    const USER_FONTS_DIRECTORY: &str = ".fonts";

    pub struct FontLoaderLinux {
        fonts: PathBuf,
        system_directory: PathBuf,
        user_directory: PathBuf,
        fonts_loaded: Vec<PathBuf>,
    }

    impl FontLoaderLinux {
        pub fn new(fonts: PathBuf) -> Result<Self> {
            let home = dirs::home_dir().ok_or_else(|| {
                PlayerError::Config("unable to find the home directory".to_string())
            })?;

            Ok(Self::with_directories(
                fonts,
                PathBuf::from(SYSTEM_FONTS_DIRECTORY),
                home.join(USER_FONTS_DIRECTORY),
            ))
        }

        pub fn with_directories(fonts: PathBuf, system_directory: PathBuf, user_directory: PathBuf) -> Self {
            debug!("Using Linux font loader");
            Self {
                fonts,
                system_directory,
                user_directory,
                fonts_loaded: Vec::new(),
            }
        }

        pub fn fonts_loaded(&self) -> &[PathBuf] {
            &self.fonts_loaded
        }

        fn load_from_resources_directory(&mut self) -> Result<()> {
            debug!("Scanning fonts directory");
            let fonts = get_all_fonts(&self.fonts);
            debug!("Found {} font(s) to load", fonts.len());
            self.load_from_list(&fonts)
        }

        fn load_from_list(&mut self, fonts: &[PathBuf]) -> Result<()> {
            for font in fonts {
                if let Some(name) = font.file_name() {
                    debug!("Font '{}' found to be loaded", name.to_string_lossy());
                }
                self.load_font(font)?;
            }
            Ok(())
        }

        pub fn load_font(&mut self, font: &Path) -> Result<()> {
            let Some(name) = font.file_name() else {
                return Ok(());
            };
            let display_name = name.to_string_lossy();

            if self.system_directory.join(name).is_file() {
                debug!("Font '{}' found in system directory", display_name);
                return Ok(());
            }

            let user_font = self.user_directory.join(name);
            if user_font.is_file() {
                debug!("Font '{}' found in user directory", display_name);
                return Ok(());
            }

            if user_font.is_symlink() {
                let target = fs::read_link(&user_font)?;
                if target.exists() {
                    debug!("Font '{}' found as symbolic link in user directory", display_name);
                    return Ok(());
                }

                debug!(
                    "Dead symbolic link found for font '{}' in user directory, removing it",
                    display_name
                );
                fs::remove_file(&user_font)?;
            }

            symlink(font, &user_font)?;
            debug!(
                "Font '{}' loaded in user directory: '{}'",
                display_name,
                user_font.display()
            );
            self.fonts_loaded.push(user_font);
            Ok(())
        }

        fn unload_font(&mut self, font: &Path) {
            match fs::remove_file(font) {
                Ok(()) => {
                    self.fonts_loaded.retain(|loaded| loaded != font);
                    debug!("Font '{}' unloaded", font.display());
                }
                Err(_) => error!("Unable to unload '{}'", font.display()),
            }
        }
    }

    impl FontLoader for FontLoaderLinux {
        fn load(&mut self) -> Result<()> {
            fs::create_dir_all(&self.user_directory)?;
            self.load_from_resources_directory()
        }

        fn unload(&mut self) {
            let fonts = self.fonts_loaded.clone();
            for font in fonts {
                self.unload_font(&font);
            }
        }
    }

    impl Drop for FontLoaderLinux {
        fn drop(&mut self) {
            self.unload();
        }
    }
}

/// Asks the user to install the fonts by hand.
pub struct FontLoaderWindows<W, R> {
    fonts: PathBuf,
    output: W,
    input: R,
}

impl<W: Write, R: BufRead> FontLoaderWindows<W, R> {
    pub fn new(fonts: PathBuf, output: W, input: R) -> Self {
        debug!("Using Windows font loader");
        Self { fonts, output, input }
    }
}

impl<W: Write, R: BufRead> FontLoader for FontLoaderWindows<W, R> {
    fn load(&mut self) -> Result<()> {
        let fonts = get_all_fonts(&self.fonts);
        writeln!(
            self.output,
            "Please install the following fonts located in the '{}' folder and press Enter:",
            self.fonts.display()
        )?;
        for font in &fonts {
            if let Some(name) = font.file_name() {
                writeln!(self.output, "{}", name.to_string_lossy())?;
            }
        }
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(())
    }

    fn unload(&mut self) {
        let _ = writeln!(self.output, "You can now remove the installed fonts");
    }
}
