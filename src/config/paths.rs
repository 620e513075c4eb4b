//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-assistant\
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Linux:   ~/.config/voice-assistant/
//!
//! Data dir (whisper models):
//!   Windows: %LOCALAPPDATA%\voice-assistant\
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Linux:   ~/.local/share/voice-assistant/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-assistant";

    /// Resolves all paths using the `dirs` crate, falling back to the current
    /// directory when the platform provides none.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
        }
    }

    /// Path of the whisper model called `name` (`ggml-<name>.bin`).
    pub fn model_file(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{name}.bin"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
