//! Voice-enabled assistant widget.
//!
//! ```text
//! app (egui) ──intents──▶ conversation ──▶ chat (HTTP)
//!     ▲                      │   ▲
//!     └──── view ────────────┘   └── speech::capture (audio + stt)
//!                                └─▶ speech::playback (synth)
//! ```

pub mod app;
pub mod audio;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod speech;
pub mod stt;
