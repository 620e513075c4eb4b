//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]` so a partially written
//! `settings.toml` still loads.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Settings for the backend chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Full URL of the chat endpoint.  Receives `{"message": …}` and answers
    /// with `{"reply": …}`.
    pub endpoint: String,
    /// Bearer token, or `None` for local backends that need no authentication.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for a reply before the request is treated as
    /// failed.
    pub timeout_secs: u64,
    /// Text shown in the history when a request fails for any reason.
    pub fallback_message: String,
}

impl ChatConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5001/api/chat".into(),
            api_key: None,
            timeout_secs: 30,
            fallback_message:
                "Sorry, I couldn't reach the assistant. Check your connection and try again."
                    .into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for microphone dictation (speech-to-text).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether the microphone button is offered at all.
    pub enabled: bool,
    /// GGML model file stem under the models directory (e.g. `"base.en"`).
    pub model: String,
    /// Recognition language as an ISO-639-1 code.  Fixed for the session.
    pub language: String,
    /// RMS level above which a 30 ms frame counts as speech.
    pub vad_threshold: f32,
    /// Trailing silence (ms) after speech that ends the utterance.
    pub end_silence_ms: u64,
    /// Hard cap on a single listening session, in seconds.
    pub max_listen_secs: f32,
    /// Audio input device name; `None` means the system default.
    pub audio_device: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "base.en".into(),
            language: "en".into(),
            vad_threshold: 0.01,
            end_silence_ms: 900,
            max_listen_secs: 15.0,
            audio_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceConfig
// ---------------------------------------------------------------------------

/// Settings for spoken replies (text-to-speech).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Initial value of the "speak replies" toggle.
    pub enabled: bool,
    /// Synthesizer executable.  Reads the text to speak on stdin.
    pub command: String,
    /// Voice name passed with `-v`; `None` keeps the synthesizer default.
    pub voice: Option<String>,
    /// Speaking rate in words per minute; `None` keeps the default.
    pub rate: Option<u32>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let command = if cfg!(target_os = "macos") {
            "say"
        } else {
            "espeak-ng"
        };
        Self {
            enabled: true,
            command: command.into(),
            voice: None,
            rate: None,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui widget appearance and behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Widget position `(x, y)` in screen pixels, saved when the widget
    /// exits.  `None` lets the window manager pick a position.
    pub window_position: Option<(f32, f32)>,
    /// Keep the widget floating above all other windows.
    pub always_on_top: bool,
    /// Title shown in the widget header.
    pub title: String,
    /// Assistant message placed in the history when the widget starts.
    pub greeting: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_position: None,
            always_on_top: true,
            title: "Assistant".into(),
            greeting: Some("Hi! Speak or type to me.".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_assistant::config::{AppConfig, AppPaths};
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load_from(&AppPaths::new().settings_file).unwrap();
/// println!("{}", config.chat.endpoint);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend chat endpoint.
    pub chat: ChatConfig,
    /// Dictation settings.
    pub speech: SpeechConfig,
    /// Spoken reply settings.
    pub voice: VoiceConfig,
    /// UI / widget settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load from `path`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories as
    /// needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
