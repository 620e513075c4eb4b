//! Speech-to-text engine used by microphone dictation.
//!
//! ```rust,no_run
//! use voice_assistant::stt::{SttEngine, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.en.bin", "en")
//!     .expect("model not found");
//!
//! // audio: 16 kHz, mono, f32 PCM from the audio module
//! let audio: Vec<f32> = vec![0.0; 16_000];
//! println!("{}", engine.transcribe(&audio).unwrap());
//! ```

pub mod engine;

pub use engine::{SttEngine, SttError, WhisperEngine, MIN_AUDIO_SAMPLES};

#[cfg(test)]
pub use engine::MockSttEngine;
