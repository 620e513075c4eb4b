//! Speech adapters: dictation in, spoken replies out.
//!
//! * [`SpeechCapture`] / [`MicrophoneDictation`]: single-utterance
//!   speech-to-text with exactly one terminal [`CaptureEvent`] per start.
//! * [`SpeechPlayback`]: at-most-one-utterance text-to-speech with mute.
//! * [`Synthesizer`] / [`CommandSynthesizer`]: platform speech output.

pub mod capture;
pub mod playback;
pub mod synth;

pub use capture::{
    CaptureError, CaptureEvent, MicrophoneDictation, RecognitionFailure, SpeechCapture,
    TerminalSink, UnavailableCapture,
};
pub use playback::SpeechPlayback;
pub use synth::{CommandSynthesizer, PlaybackError, Synthesizer, Utterance};
