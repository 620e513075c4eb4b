//! Application entry point: voice assistant widget.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the chat transport, dictation and playback adapters.
//! 5. Spawn the [`Conversation`] controller on the runtime.
//! 6. Run [`eframe::run_native`], which blocks until the window is closed.
//! 7. Send shutdown to the controller and wait briefly for it to release
//!    the microphone and speech output.

use std::sync::Arc;
use std::time::Duration;

use voice_assistant::{
    app::ChatWidget,
    chat::{ChatTransport, HttpChatTransport},
    config::{AppConfig, AppPaths},
    conversation::Conversation,
    speech::{
        CommandSynthesizer, MicrophoneDictation, SpeechCapture, SpeechPlayback,
        UnavailableCapture,
    },
    stt::{SttEngine, WhisperEngine},
};

use eframe::egui;

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Microphone dictation when enabled and a model is present, otherwise a
/// capture that reports why voice input is unavailable.
fn build_capture(config: &AppConfig, paths: &AppPaths) -> Box<dyn SpeechCapture> {
    if !config.speech.enabled {
        return Box::new(UnavailableCapture::new("voice input is disabled in settings"));
    }

    let model_path = paths.model_file(&config.speech.model);
    match WhisperEngine::load(&model_path, &config.speech.language) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", model_path.display());
            let stt: Arc<dyn SttEngine> = Arc::new(engine);
            Box::new(MicrophoneDictation::new(stt, config.speech.clone()))
        }
        Err(e) => {
            log::warn!("Could not load Whisper model ({}): {e}", model_path.display());
            Box::new(UnavailableCapture::new(format!(
                "speech model not found at {}",
                model_path.display()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let mut vp = egui::ViewportBuilder::default()
        .with_title(config.ui.title.clone())
        .with_decorations(false)
        .with_transparent(true)
        .with_inner_size([340.0, 460.0])
        .with_min_inner_size([72.0, 44.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice assistant starting up");

    // 2. Configuration
    let paths = AppPaths::new();
    let (config, settings_file) = match AppConfig::load_from(&paths.settings_file) {
        Ok(config) => (config, Some(paths.settings_file.clone())),
        Err(e) => {
            // Keep the unreadable file as it is for the user to fix.
            log::warn!("Failed to load config ({e}); using defaults");
            (AppConfig::default(), None)
        }
    };

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    // 4. Adapters
    let transport = HttpChatTransport::from_config(&config.chat);
    log::info!("chat endpoint: {}", transport.endpoint());
    let transport: Arc<dyn ChatTransport> = Arc::new(transport);
    let capture = build_capture(&config, &paths);
    let playback = SpeechPlayback::new(Box::new(CommandSynthesizer::from_config(&config.voice)));

    // 5. Controller
    let mut conversation = Conversation::new(&config, transport, capture, playback);
    let handle = conversation.handle();
    let view = conversation.view();
    let controller = rt.spawn(conversation.run());

    // 6. UI (blocks until the window is closed)
    let title = config.ui.title.clone();
    let options = native_options(&config);
    let widget = ChatWidget::new(view, handle.clone(), config, settings_file);
    let ui_result = eframe::run_native(&title, options, Box::new(move |_cc| Ok(Box::new(widget))));

    // 7. Teardown
    handle.shutdown();
    drop(handle);
    rt.block_on(async {
        if tokio::time::timeout(Duration::from_secs(2), controller).await.is_err() {
            log::warn!("controller did not stop within 2s");
        }
    });

    ui_result.map_err(|e| anyhow::anyhow!("UI error: {e}"))
}
