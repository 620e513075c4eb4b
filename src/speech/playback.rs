//! Speech Playback Adapter: at most one utterance at a time.
//!
//! There is no queue: [`SpeechPlayback::speak`] cancels whatever is playing
//! and starts the new text immediately, so replies that arrive faster than
//! they can be spoken never overlap.  [`SpeechPlayback::mute`] silences the
//! current utterance and swallows further `speak` calls until
//! [`SpeechPlayback::unmute`].
//!
//! Playback is fire-and-forget: synthesizer failures are logged, never
//! returned.

use super::synth::{Synthesizer, Utterance};

pub struct SpeechPlayback {
    synth: Box<dyn Synthesizer>,
    current: Option<Box<dyn Utterance>>,
    muted: bool,
}

impl SpeechPlayback {
    pub fn new(synth: Box<dyn Synthesizer>) -> Self {
        Self {
            synth,
            current: None,
            muted: false,
        }
    }

    /// Pre-empt the current utterance and speak `text`.
    pub fn speak(&mut self, text: &str) {
        if self.muted {
            log::debug!("playback: muted, not speaking");
            return;
        }
        if text.trim().is_empty() {
            return;
        }

        self.cancel();

        match self.synth.start(text) {
            Ok(utterance) => self.current = Some(utterance),
            Err(e) => log::warn!("playback: {e}"),
        }
    }

    /// Silence now and ignore `speak` until [`unmute`](Self::unmute).
    pub fn mute(&mut self) {
        self.muted = true;
        self.cancel();
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    #[cfg(test)]
    fn is_muted(&self) -> bool {
        self.muted
    }

    /// Stop the current utterance without changing the mute state.
    pub fn cancel(&mut self) {
        if let Some(mut utterance) = self.current.take() {
            utterance.cancel();
        }
    }

    /// `true` while an utterance is audible.
    #[cfg(test)]
    fn is_speaking(&mut self) -> bool {
        self.current.as_mut().is_some_and(|u| u.is_playing())
    }
}

impl Drop for SpeechPlayback {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
