//! Conversation data model and the read-only view handed to the UI.
//!
//! [`ConversationState`] is owned by the [`Conversation`] controller; the
//! egui widget only ever sees it through [`ConversationView`], which exposes
//! reads and nothing else.
//!
//! [`Conversation`]: super::Conversation

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Who a [`Turn`] is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// A failure notice shown in place of an assistant reply.
    SystemError,
}

/// One message in the history.  Fields are private: a turn cannot change
/// once it has been appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    id: u64,
    role: Role,
    text: String,
}

impl Turn {
    /// Monotonically increasing within one conversation.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// States of the conversation controller.
///
/// ```text
/// Idle ──submit──────────▶ AwaitingResponse ──reply / error──▶ Idle
/// Idle ──toggle mic──────▶ Listening ──transcript──▶ AwaitingResponse
///                                    ──failed / cancelled / toggle──▶ Idle
/// Idle ──mic unavailable─▶ Error ──(same step)──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Listening,
    AwaitingResponse,
    /// Transient: recorded while an error is surfaced, then back to Idle.
    Error,
}

impl Status {
    /// `true` while a request is in flight.  The UI disables the send and
    /// microphone buttons.
    ///
    /// ```
    /// use voice_assistant::conversation::Status;
    ///
    /// assert!(!Status::Idle.is_busy());
    /// assert!(!Status::Listening.is_busy());
    /// assert!(Status::AwaitingResponse.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::AwaitingResponse)
    }

    /// A short human-readable label for the widget header.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "Ready",
            Status::Listening => "Listening…",
            Status::AwaitingResponse => "Thinking…",
            Status::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// Session state of the widget: history, status and the voice toggle.
#[derive(Debug, Default)]
pub struct ConversationState {
    history: Vec<Turn>,
    status: Status,
    voice_output_enabled: bool,
    notice: Option<String>,
    next_turn_id: u64,
}

impl ConversationState {
    pub fn new(voice_output_enabled: bool) -> Self {
        Self {
            voice_output_enabled,
            next_turn_id: 1,
            ..Self::default()
        }
    }

    /// All turns in chronological order.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn voice_output_enabled(&self) -> bool {
        self.voice_output_enabled
    }

    /// Latest informational notice (e.g. "voice input unavailable").
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub(crate) fn push_turn(&mut self, role: Role, text: impl Into<String>) -> u64 {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        self.history.push(Turn {
            id,
            role,
            text: text.into(),
        });
        id
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        if self.status != status {
            log::debug!("conversation: {:?} → {:?}", self.status, status);
            self.status = status;
        }
    }

    pub(crate) fn set_voice_output(&mut self, enabled: bool) {
        self.voice_output_enabled = enabled;
    }

    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }
}

// ---------------------------------------------------------------------------
// Shared state and view
// ---------------------------------------------------------------------------

/// The controller's handle on its own state.  Locks are short and never
/// held across `.await`.
pub(crate) type SharedConversation = Arc<Mutex<ConversationState>>;

pub(crate) fn lock(state: &SharedConversation) -> MutexGuard<'_, ConversationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read-only access to the conversation for the presentation layer.
///
/// Cheap to clone.  There is deliberately no way to obtain a mutable
/// reference through a view; changes go through
/// [`ConversationHandle`](super::ConversationHandle) intents.
#[derive(Clone)]
pub struct ConversationView {
    inner: SharedConversation,
}

impl ConversationView {
    pub(crate) fn new(inner: SharedConversation) -> Self {
        Self { inner }
    }

    /// Run `f` against the current state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&ConversationState) -> R) -> R {
        f(&lock(&self.inner))
    }

    pub fn status(&self) -> Status {
        self.read(|s| s.status())
    }

    pub fn history(&self) -> Vec<Turn> {
        self.read(|s| s.history().to_vec())
    }

    pub fn turn_count(&self) -> usize {
        self.read(|s| s.history().len())
    }

    pub fn voice_output_enabled(&self) -> bool {
        self.read(|s| s.voice_output_enabled())
    }

    pub fn notice(&self) -> Option<String> {
        self.read(|s| s.notice().map(str::to_string))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
