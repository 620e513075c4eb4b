//! Speech Capture Adapter: single-utterance dictation.
//!
//! [`SpeechCapture::start_dictation`] either fails immediately with
//! [`CaptureError::CapabilityUnavailable`] or guarantees that the sink it was
//! given is called exactly once with a terminal [`CaptureEvent`].  The sink is
//! an `FnOnce`, so "exactly once" is enforced by the type system.
//!
//! # Microphone session
//!
//! ```text
//! start_dictation ──▶ wait for the previous stream to close
//!                  └─▶ check device (sync, may fail)
//!                  └─▶ dictation thread
//!                        open MicStream ─▶ chunks ─▶ to_mono_16k ─▶ EndpointDetector
//!                        │   stop flag ──▶ Cancelled / Failed(Aborted)
//!                        │   trailing silence ──▶ drop MicStream
//!                        └─▶ trim_silence ─▶ SttEngine::transcribe ─▶ sink(event)
//! ```
//!
//! The microphone is only open while the thread is recording; it is released
//! before transcription starts and whenever the stop flag is raised.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::audio::{
    to_mono_16k, trim_silence, AudioChunk, AudioError, Endpoint, EndpointDetector, Microphone,
};
use crate::config::SpeechConfig;
use crate::stt::{SttEngine, SttError};

/// How often the recording loop checks the stop flag when no audio arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// The single event that ends one dictation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    TranscriptReady(String),
    RecognitionFailed(RecognitionFailure),
    /// Stopped by the user before any speech was heard.
    RecognitionCancelled,
}

/// Why a dictation attempt produced no transcript.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionFailure {
    #[error("no speech detected")]
    NoSpeech,

    #[error("dictation stopped mid-utterance")]
    Aborted,

    #[error("microphone failure: {0}")]
    Audio(String),

    #[error("recognizer failure: {0}")]
    Engine(String),
}

/// Synchronous failure of [`SpeechCapture::start_dictation`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("speech recognition unavailable: {0}")]
    CapabilityUnavailable(String),
}

/// Receives the terminal event of one dictation attempt.
pub type TerminalSink = Box<dyn FnOnce(CaptureEvent) + Send + 'static>;

// ---------------------------------------------------------------------------
// SpeechCapture trait
// ---------------------------------------------------------------------------

/// Platform speech-to-text, reduced to start/stop plus one terminal event.
pub trait SpeechCapture: Send {
    /// Begin listening.  On `Ok`, `sink` will be called exactly once.
    fn start_dictation(&mut self, sink: TerminalSink) -> Result<(), CaptureError>;

    /// Stop listening.  Safe to call at any time, any number of times.
    fn stop_dictation(&mut self);
}

// ---------------------------------------------------------------------------
// Unavailable
// ---------------------------------------------------------------------------

/// Capture backend for platforms without speech recognition.  Every start
/// fails with the reason given at construction.
#[derive(Debug, Clone)]
pub struct UnavailableCapture {
    reason: String,
}

impl UnavailableCapture {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SpeechCapture for UnavailableCapture {
    fn start_dictation(&mut self, _sink: TerminalSink) -> Result<(), CaptureError> {
        Err(CaptureError::CapabilityUnavailable(self.reason.clone()))
    }

    fn stop_dictation(&mut self) {}
}

// ---------------------------------------------------------------------------
// Audio source
// ---------------------------------------------------------------------------

/// Where dictation audio comes from.
///
/// `open` runs on the dictation thread; the returned guard keeps the device
/// open until it is dropped.
pub trait AudioSource: Send + Sync {
    /// Check that the device exists without opening a stream.
    fn check(&self) -> Result<(), AudioError>;

    /// Start streaming chunks into `tx`.
    fn open(&self, tx: mpsc::Sender<AudioChunk>) -> Result<Box<dyn Any>, AudioError>;
}

/// The cpal input device named in [`SpeechConfig::audio_device`].
struct DeviceSource {
    device: Option<String>,
}

impl AudioSource for DeviceSource {
    fn check(&self) -> Result<(), AudioError> {
        Microphone::open(self.device.as_deref()).map(|_| ())
    }

    fn open(&self, tx: mpsc::Sender<AudioChunk>) -> Result<Box<dyn Any>, AudioError> {
        let mic = Microphone::open(self.device.as_deref())?;
        Ok(Box::new(mic.start(tx)?))
    }
}

// ---------------------------------------------------------------------------
// MicrophoneDictation
// ---------------------------------------------------------------------------

/// Upper bound on waiting for a stopped session to let go of the device.
/// The worker notices the stop flag within one [`POLL_INTERVAL`].
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

struct ActiveSession {
    stop: Arc<AtomicBool>,
    /// Disconnects once the worker has dropped its stream.
    released: mpsc::Receiver<()>,
}

/// Dictation on the local microphone, recognised by an [`SttEngine`].
///
/// At most one session holds the device: a new start first waits for the
/// previous worker to drop its stream.
pub struct MicrophoneDictation {
    stt: Arc<dyn SttEngine>,
    source: Arc<dyn AudioSource>,
    settings: SpeechConfig,
    active: Option<ActiveSession>,
    /// Release signal of the last stopped session.
    stopping: Option<mpsc::Receiver<()>>,
}

impl MicrophoneDictation {
    pub fn new(stt: Arc<dyn SttEngine>, settings: SpeechConfig) -> Self {
        let source = Arc::new(DeviceSource {
            device: settings.audio_device.clone(),
        });
        Self::with_source(stt, source, settings)
    }

    fn with_source(
        stt: Arc<dyn SttEngine>,
        source: Arc<dyn AudioSource>,
        settings: SpeechConfig,
    ) -> Self {
        Self {
            stt,
            source,
            settings,
            active: None,
            stopping: None,
        }
    }

    /// Block until the previously stopped worker has closed its stream.
    fn wait_for_release(&mut self) -> Result<(), CaptureError> {
        let Some(released) = self.stopping.take() else {
            return Ok(());
        };
        match released.recv_timeout(RELEASE_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("dictation: previous session still holds the microphone");
                self.stopping = Some(released);
                Err(CaptureError::CapabilityUnavailable(
                    "microphone is still in use".into(),
                ))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }
}

impl SpeechCapture for MicrophoneDictation {
    fn start_dictation(&mut self, sink: TerminalSink) -> Result<(), CaptureError> {
        // One microphone session at a time.
        self.stop_dictation();
        self.wait_for_release()?;

        // Check on the caller's thread so a missing device fails synchronously.
        // The stream itself is opened on the worker because cpal streams are
        // not Send on every platform.
        self.source
            .check()
            .map_err(|e| CaptureError::CapabilityUnavailable(e.to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let (released_tx, released) = mpsc::channel();
        {
            let stop = Arc::clone(&stop);
            let stt = Arc::clone(&self.stt);
            let source = Arc::clone(&self.source);
            let settings = self.settings.clone();
            std::thread::Builder::new()
                .name("dictation".into())
                .spawn(move || {
                    let event =
                        dictate(stt.as_ref(), source.as_ref(), &settings, &stop, released_tx);
                    log::debug!("dictation: terminal event {event:?}");
                    sink(event);
                })
                .map_err(|e| CaptureError::CapabilityUnavailable(e.to_string()))?;
        }

        log::info!("dictation: listening");
        self.active = Some(ActiveSession { stop, released });
        Ok(())
    }

    fn stop_dictation(&mut self) {
        if let Some(session) = self.active.take() {
            session.stop.store(true, Ordering::Release);
            self.stopping = Some(session.released);
            log::debug!("dictation: stop requested");
        }
    }
}

impl Drop for MicrophoneDictation {
    fn drop(&mut self) {
        self.stop_dictation();
    }
}

// ---------------------------------------------------------------------------
// Dictation thread body
// ---------------------------------------------------------------------------

fn dictate(
    stt: &dyn SttEngine,
    source: &dyn AudioSource,
    settings: &SpeechConfig,
    stop: &AtomicBool,
    released: mpsc::Sender<()>,
) -> CaptureEvent {
    let audio = {
        // Declared before the stream so it is dropped after it.
        let _released = released;
        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let _stream = match source.open(tx) {
            Ok(stream) => stream,
            Err(e) => return CaptureEvent::RecognitionFailed(RecognitionFailure::Audio(e.to_string())),
        };

        let detector = EndpointDetector::new(
            settings.vad_threshold,
            settings.end_silence_ms,
            settings.max_listen_secs,
        );
        match record_utterance(&rx, detector, stop) {
            Ok(audio) => audio,
            Err(event) => return event,
        }
        // `_stream` dropped here: microphone released before transcription.
    };

    if stop.load(Ordering::Acquire) {
        return CaptureEvent::RecognitionFailed(RecognitionFailure::Aborted);
    }

    transcribe_utterance(stt, &audio, settings.vad_threshold)
}

/// Pull chunks until the detector reports the end of the utterance.
///
/// `Err` carries the terminal event when recording ends without usable audio.
fn record_utterance(
    rx: &mpsc::Receiver<AudioChunk>,
    mut detector: EndpointDetector,
    stop: &AtomicBool,
) -> Result<Vec<f32>, CaptureEvent> {
    let mut audio = Vec::new();

    loop {
        if stop.load(Ordering::Acquire) {
            return Err(if detector.speech_detected() {
                CaptureEvent::RecognitionFailed(RecognitionFailure::Aborted)
            } else {
                CaptureEvent::RecognitionCancelled
            });
        }

        let chunk = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CaptureEvent::RecognitionFailed(RecognitionFailure::Audio(
                    "microphone stream closed".into(),
                )))
            }
        };

        let mono = to_mono_16k(&chunk.samples, chunk.sample_rate, chunk.channels);
        audio.extend_from_slice(&mono);

        match detector.push(&mono) {
            Endpoint::Continue => {}
            Endpoint::UtteranceEnded => return Ok(audio),
            Endpoint::LimitReached if detector.speech_detected() => return Ok(audio),
            Endpoint::LimitReached => {
                return Err(CaptureEvent::RecognitionFailed(RecognitionFailure::NoSpeech))
            }
        }
    }
}

fn transcribe_utterance(stt: &dyn SttEngine, audio: &[f32], threshold: f32) -> CaptureEvent {
    let clip = trim_silence(audio, threshold);

    match stt.transcribe(clip) {
        Ok(text) if !text.trim().is_empty() => CaptureEvent::TranscriptReady(text.trim().to_string()),
        Ok(_) | Err(SttError::AudioTooShort) => {
            CaptureEvent::RecognitionFailed(RecognitionFailure::NoSpeech)
        }
        Err(e) => CaptureEvent::RecognitionFailed(RecognitionFailure::Engine(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
