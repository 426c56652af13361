//! Where the satellite looks for `settings.toml`.
//!
//!   Windows: %APPDATA%\voice-satellite\settings.toml
//!   macOS:   ~/Library/Application Support/voice-satellite/settings.toml
//!   Linux:   ~/.config/voice-satellite/settings.toml
//!
//! The satellite only reads this file, so no directory is ever created.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "voice-satellite";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl AppPaths {
    /// Platform config dir, or the working directory when there is none.
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under(&base)
    }

    /// Layout rooted at `base` instead of the platform config dir.
    pub fn under(base: &Path) -> Self {
        let config_dir = base.join(APP_DIR);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            config_dir,
        }
    }

    /// `explicit` if given, else the default settings file.
    pub fn settings_file_or(&self, explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(|| self.settings_file.clone(), Path::to_path_buf)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_base() {
        let paths = AppPaths::under(Path::new("/etc/xdg"));
        assert_eq!(paths.config_dir, Path::new("/etc/xdg/voice-satellite"));
        assert_eq!(paths.settings_file, Path::new("/etc/xdg/voice-satellite/settings.toml"));
    }

    #[test]
    fn platform_layout_ends_in_app_dir() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert!(paths.settings_file.starts_with(&paths.config_dir));
    }

    #[test]
    fn explicit_file_wins() {
        let paths = AppPaths::under(Path::new("/home/pi/.config"));
        assert_eq!(
            paths.settings_file_or(Some(Path::new("/srv/sat.toml"))),
            Path::new("/srv/sat.toml")
        );
        assert_eq!(paths.settings_file_or(None), paths.settings_file);
    }
}
