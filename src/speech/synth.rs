//! Platform text-to-speech backends.
//!
//! A [`Synthesizer`] starts an utterance and hands back an [`Utterance`]
//! handle that can be cancelled.  Queueing and pre-emption policy live in
//! [`crate::speech::SpeechPlayback`]; backends only know how to start and
//! stop one utterance.
//!
//! [`CommandSynthesizer`] drives a speech command (`espeak-ng` on Linux and
//! Windows, `say` on macOS).  The text is written to the child's stdin and
//! killing the child silences it immediately.  A helper thread per
//! utterance writes the text and then reaps the child once it exits.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::config::VoiceConfig;

/// Errors from starting an utterance.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("speech command {command:?} could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// One utterance in progress.
pub trait Utterance: Send {
    /// Silence the utterance now.  Idempotent.
    fn cancel(&mut self);

    /// `true` until the utterance finishes or is cancelled.
    fn is_playing(&mut self) -> bool;
}

/// Starts utterances on the platform's speech output.
pub trait Synthesizer: Send {
    fn start(&mut self, text: &str) -> Result<Box<dyn Utterance>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// CommandSynthesizer
// ---------------------------------------------------------------------------

/// Speaks by running an external speech command.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    command: String,
    voice: Option<String>,
    rate: Option<u32>,
}

impl CommandSynthesizer {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            command: config.command.clone(),
            voice: config.voice.clone(),
            rate: config.rate,
        }
    }

    /// Command-line flags for voice and rate.  `say` spells the rate flag
    /// `-r`, espeak spells it `-s`; both take `-v` for the voice.
    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        if let Some(rate) = self.rate {
            let is_say = std::path::Path::new(&self.command)
                .file_stem()
                .is_some_and(|stem| stem == "say");
            args.push(if is_say { "-r" } else { "-s" }.to_string());
            args.push(rate.to_string());
        }
        args
    }
}

impl Synthesizer for CommandSynthesizer {
    fn start(&mut self, text: &str) -> Result<Box<dyn Utterance>, PlaybackError> {
        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlaybackError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let child = Arc::new(Mutex::new(child));
        let text = text.to_string();
        let watched = Arc::clone(&child);
        std::thread::Builder::new()
            .name("speech".into())
            .spawn(move || {
                // Both commands read the text from stdin when none is given
                // on the command line; closing stdin starts playback.
                if let Some(mut stdin) = stdin {
                    if let Err(e) = stdin.write_all(text.as_bytes()) {
                        log::debug!("speech: stdin write ended early: {e}");
                    }
                }
                reap_when_done(&watched);
            })
            .map_err(|source| PlaybackError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        Ok(Box::new(ChildUtterance { child }))
    }
}

/// How often a finished speech process is checked for.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll until the process has exited; `try_wait` reaps it.
fn reap_when_done(child: &Mutex<Child>) {
    loop {
        match lock_child(child).try_wait() {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => return,
        }
        std::thread::sleep(REAP_INTERVAL);
    }
}

/// An utterance backed by a running speech process.
struct ChildUtterance {
    child: Arc<Mutex<Child>>,
}

impl Utterance for ChildUtterance {
    fn cancel(&mut self) {
        let mut child = lock_child(&self.child);
        if matches!(child.try_wait(), Ok(None)) {
            if let Err(e) = child.kill() {
                log::debug!("speech: kill failed: {e}");
            }
            // Reap right away so no zombie is left behind.
            let _ = child.wait();
        }
    }

    fn is_playing(&mut self) -> bool {
        matches!(lock_child(&self.child).try_wait(), Ok(None))
    }
}

impl Drop for ChildUtterance {
    fn drop(&mut self) {
        self.cancel();
    }
}
