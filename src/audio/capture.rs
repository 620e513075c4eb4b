//! Microphone capture via `cpal`.
//!
//! [`Microphone`] resolves an input device; [`Microphone::start`] begins
//! streaming [`AudioChunk`]s over a std mpsc channel.  The returned
//! [`MicStream`] is the only thing keeping the hardware stream open;
//! dropping it releases the microphone.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`; see
/// [`crate::audio::to_mono_16k`] for the conversion the recognizer needs.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or running the microphone.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no input device available")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// MicStream
// ---------------------------------------------------------------------------

/// RAII guard for an open input stream.  Dropping it stops capture.
pub struct MicStream {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// An input device plus the stream configuration it prefers.
pub struct Microphone {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl Microphone {
    /// Open the named input device, or the host default when `name` is
    /// `None`.
    pub fn open(name: Option<&str>) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = match name {
            None => host.default_input_device().ok_or(AudioError::NoDevice)?,
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string()))?,
        };

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;

        Ok(Self {
            device,
            config: supported.into(),
            sample_rate,
            channels,
        })
    }

    /// Start the hardware stream and forward every callback buffer to `tx`.
    ///
    /// Send errors (receiver dropped) are ignored so the audio thread never
    /// panics.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<MicStream, AudioError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("microphone stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::debug!("microphone opened ({sample_rate} Hz, {channels} ch)");
        Ok(MicStream { _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
