//! Audio front end for dictation: microphone → 16 kHz mono → endpointing.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → to_mono_16k
//!           → EndpointDetector (stop after trailing silence) → trim_silence
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use voice_assistant::audio::{AudioChunk, Microphone};
//!
//! let (tx, rx) = mpsc::channel::<AudioChunk>();
//! let mic = Microphone::open(None).unwrap();
//! let _stream = mic.start(tx).unwrap(); // dropping the stream releases the mic
//!
//! while let Ok(chunk) = rx.recv() {
//!     println!("received {} samples @ {}Hz", chunk.samples.len(), chunk.sample_rate);
//! }
//! ```

pub mod capture;
pub mod convert;
pub mod endpoint;

pub use capture::{AudioChunk, AudioError, MicStream, Microphone};
pub use convert::{downmix, resample, to_mono_16k, TARGET_RATE};
pub use endpoint::{trim_silence, Endpoint, EndpointDetector};
