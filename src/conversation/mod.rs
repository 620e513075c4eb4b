//! Conversation state machine.
//!
//! * [`Conversation`] owns the history, the status and the voice toggle, and
//!   is the only code that changes them.
//! * [`ConversationHandle`] carries user intents and lifecycle events in.
//! * [`ConversationView`] lets the widget read state without mutating it.

pub mod controller;
pub mod state;

pub use controller::{Conversation, ConversationHandle, Event, Flow, Intent};
pub use state::{ConversationState, ConversationView, Role, Status, Turn};
