//! Energy-based end-of-utterance detection.
//!
//! Dictation is single-utterance: the microphone stays open until the
//! speaker has said something and then gone quiet for a while.
//! [`EndpointDetector`] consumes 16 kHz mono audio incrementally, classifies
//! 30 ms frames (480 samples) as voice when their RMS exceeds a threshold,
//! and reports when the utterance is over.
//!
//! [`trim_silence`] cuts leading/trailing silence from the finished clip so
//! Whisper does not hallucinate text over quiet stretches.

/// 30 ms at 16 kHz.
const FRAME_SIZE: usize = 480;
const FRAME_MS: u64 = 30;

/// Outcome of feeding audio to an [`EndpointDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep listening.
    Continue,
    /// Speech was followed by enough trailing silence.
    UtteranceEnded,
    /// The listening budget ran out.  Check
    /// [`EndpointDetector::speech_detected`] to tell an overlong utterance
    /// from no speech at all.
    LimitReached,
}

fn is_voice(frame: &[f32], threshold: f32) -> bool {
    if frame.is_empty() {
        return false;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt() > threshold
}

/// Incremental silence-after-speech detector.
#[derive(Debug)]
pub struct EndpointDetector {
    threshold: f32,
    end_silence_frames: usize,
    max_frames: usize,
    pending: Vec<f32>,
    frames: usize,
    silent_run: usize,
    speech_seen: bool,
}

impl EndpointDetector {
    /// * `threshold`: RMS level above which a frame counts as speech.
    /// * `end_silence_ms`: trailing silence that ends the utterance.
    /// * `max_listen_secs`: hard cap on the session.
    pub fn new(threshold: f32, end_silence_ms: u64, max_listen_secs: f32) -> Self {
        let end_silence_frames = (end_silence_ms / FRAME_MS).max(1) as usize;
        let max_frames = ((max_listen_secs.max(0.0) * 1000.0) as u64 / FRAME_MS).max(1) as usize;
        Self {
            threshold,
            end_silence_frames,
            max_frames,
            pending: Vec::with_capacity(FRAME_SIZE),
            frames: 0,
            silent_run: 0,
            speech_seen: false,
        }
    }

    /// `true` once at least one voice frame has been seen.
    pub fn speech_detected(&self) -> bool {
        self.speech_seen
    }

    /// Feed 16 kHz mono samples.  Partial frames are carried over to the
    /// next call.
    pub fn push(&mut self, samples: &[f32]) -> Endpoint {
        self.pending.extend_from_slice(samples);

        let mut consumed = 0;
        let mut outcome = Endpoint::Continue;

        while self.pending.len() - consumed >= FRAME_SIZE {
            let frame = &self.pending[consumed..consumed + FRAME_SIZE];
            consumed += FRAME_SIZE;
            self.frames += 1;

            if is_voice(frame, self.threshold) {
                self.speech_seen = true;
                self.silent_run = 0;
            } else {
                self.silent_run += 1;
            }

            if self.speech_seen && self.silent_run >= self.end_silence_frames {
                outcome = Endpoint::UtteranceEnded;
                break;
            }
            if self.frames >= self.max_frames {
                outcome = Endpoint::LimitReached;
                break;
            }
        }

        self.pending.drain(..consumed);
        outcome
    }
}

/// Trim leading and trailing silence from a 16 kHz mono clip.
///
/// Returns a sub-slice; an all-silent clip yields an empty slice.
pub fn trim_silence(audio: &[f32], threshold: f32) -> &[f32] {
    let total_frames = audio.len().div_ceil(FRAME_SIZE);
    let frame = |i: usize| &audio[i * FRAME_SIZE..((i + 1) * FRAME_SIZE).min(audio.len())];

    let Some(first) = (0..total_frames).find(|&i| is_voice(frame(i), threshold)) else {
        return &audio[0..0];
    };
    let last = (0..total_frames)
        .rfind(|&i| is_voice(frame(i), threshold))
        .unwrap_or(first);

    &audio[first * FRAME_SIZE..((last + 1) * FRAME_SIZE).min(audio.len())]
}
