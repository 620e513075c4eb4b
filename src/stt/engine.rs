//! Core STT engine trait and the Whisper implementation.
//!
//! [`SttEngine`] is object-safe and `Send + Sync` so the dictation worker can
//! hold it behind an `Arc<dyn SttEngine>`.  [`WhisperEngine`] wraps a
//! `whisper_rs::WhisperContext`; [`MockSttEngine`] (tests only) returns a
//! canned answer.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a context or state.
    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// An error occurred during the inference pass.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Less than [`MIN_AUDIO_SAMPLES`] of audio.
    #[error("audio too short to transcribe")]
    AudioTooShort,
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Minimum clip length: 0.25 s at 16 kHz.
pub const MIN_AUDIO_SAMPLES: usize = 4_000;

/// Speech-to-text on 16 kHz mono `f32` PCM.
pub trait SttEngine: Send + Sync {
    /// Transcribe `audio` and return the trimmed transcript.
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// Production STT engine backed by whisper.cpp.
///
/// A fresh `WhisperState` is created per call, so one engine can serve
/// successive dictation sessions without locking.
pub struct WhisperEngine {
    ctx: WhisperContext,
    language: String,
    n_threads: i32,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("language", &self.language)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

// SAFETY: whisper-rs declares WhisperContext Send + Sync; weights are
// read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load a GGML model for the given ISO-639-1 `language`.
    pub fn load(model_path: impl AsRef<Path>, language: &str) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!("non-UTF-8 model path: {}", path.display()))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        Ok(Self {
            ctx,
            language: language.to_string(),
            n_threads: optimal_threads(),
        })
    }
}

impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_n_threads(self.n_threads);
        params.set_single_segment(true);
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        state
            .full(params, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

/// CPU threads handed to whisper, capped at 8.
fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperEngine::load("/nonexistent/ggml-base.en.bin", "en");
        assert!(
            matches!(result, Err(SttError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    #[test]
    fn mock_enforces_minimum_length() {
        let engine = MockSttEngine::ok("hello");
        assert_eq!(
            engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES - 1]),
            Err(SttError::AudioTooShort)
        );
        assert_eq!(
            engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES]).as_deref(),
            Ok("hello")
        );
    }

    #[test]
    fn box_dyn_stt_engine_compiles() {
        let engine: Box<dyn SttEngine> =
            Box::new(MockSttEngine::err(SttError::Transcription("boom".into())));
        assert!(engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES]).is_err());
    }

    #[test]
    fn optimal_threads_is_positive_and_at_most_8() {
        let t = optimal_threads();
        assert!((1..=8).contains(&t));
    }
}
