//! Chat transport for the assistant backend.
//!
//! * [`ChatTransport`]: async trait, one request/response per call.
//! * [`HttpChatTransport`]: JSON over HTTP (`{"message"}` → `{"reply"}`).
//! * [`Reply`] / [`TransportError`]: outcome of one exchange.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_assistant::chat::{ChatTransport, HttpChatTransport};
//! use voice_assistant::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let transport = HttpChatTransport::from_config(&config.chat);
//!
//!     match transport.send("Are bikes available near the station?").await {
//!         Ok(reply) => println!("{}", reply.text),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod transport;

pub use transport::{ChatTransport, HttpChatTransport, Reply, TransportError};
