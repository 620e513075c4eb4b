//! Conversation controller: the single owner of conversation state.
//!
//! [`Conversation`] consumes [`Event`]s from one channel and handles each to
//! completion before taking the next.  User intents arrive from the widget
//! through a [`ConversationHandle`]; completions of background work (a chat
//! request, a dictation session) come back on the same channel tagged with
//! the token or session they belong to, so a result that no longer matches
//! the current state is dropped instead of applied.
//!
//! # Flow
//!
//! ```text
//! SubmitText ──▶ append User turn ──▶ spawn(timeout(transport.send))  [AwaitingResponse]
//!                                        └─▶ ChatCompleted{token}
//!                                              ├─ Ok  → Assistant turn, speak  [Idle]
//!                                              └─ Err → SystemError turn       [Idle]
//!
//! ToggleMic ──▶ capture.start_dictation(sink)                         [Listening]
//!                 └─▶ Capture{session, TranscriptReady} → SubmitText path
//!                 └─▶ Capture{session, Failed | Cancelled}             [Idle]
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::{ChatTransport, Reply, TransportError};
use crate::config::AppConfig;
use crate::speech::{CaptureError, CaptureEvent, SpeechCapture, SpeechPlayback};

use super::state::{lock, ConversationState, ConversationView, Role, SharedConversation, Status};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Requests from the user, issued by the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Send typed (or dictated) text to the assistant.
    SubmitText(String),
    /// Start dictation when idle, stop it while listening.
    ToggleMic,
    /// Flip the "speak replies" switch.
    ToggleVoiceOutput,
}

/// Everything the controller reacts to.
#[derive(Debug)]
pub enum Event {
    Intent(Intent),
    /// The widget became visible again.
    Shown,
    /// The widget was closed.  Dictation and playback stop; history and any
    /// in-flight request survive.
    Hidden,
    /// The application is exiting.  Everything is released and the
    /// controller loop ends.
    Shutdown,
    /// Terminal event of dictation session `session`.
    Capture { session: u64, event: CaptureEvent },
    /// Outcome of chat request `token`.
    ChatCompleted {
        token: u64,
        result: Result<Reply, TransportError>,
    },
}

/// Whether the controller loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

// ---------------------------------------------------------------------------
// ConversationHandle
// ---------------------------------------------------------------------------

/// Sending side used by the widget and by `main`.
///
/// All methods are non-blocking and safe to call from the egui thread.  When
/// every handle is dropped the controller loop ends.
#[derive(Clone)]
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ConversationHandle {
    pub fn submit_text(&self, text: impl Into<String>) {
        self.send(Event::Intent(Intent::SubmitText(text.into())));
    }

    pub fn toggle_mic(&self) {
        self.send(Event::Intent(Intent::ToggleMic));
    }

    pub fn toggle_voice_output(&self) {
        self.send(Event::Intent(Intent::ToggleVoiceOutput));
    }

    pub fn shown(&self) {
        self.send(Event::Shown);
    }

    pub fn hidden(&self) {
        self.send(Event::Hidden);
    }

    pub fn shutdown(&self) {
        self.send(Event::Shutdown);
    }

    fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            log::warn!("conversation: controller has stopped, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

struct PendingRequest {
    token: u64,
    task: JoinHandle<()>,
}

/// The conversation state machine.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_assistant::chat::HttpChatTransport;
/// use voice_assistant::config::AppConfig;
/// use voice_assistant::conversation::Conversation;
/// use voice_assistant::speech::{CommandSynthesizer, SpeechPlayback, UnavailableCapture};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let transport = Arc::new(HttpChatTransport::from_config(&config.chat));
/// let playback = SpeechPlayback::new(Box::new(CommandSynthesizer::from_config(&config.voice)));
/// let capture = Box::new(UnavailableCapture::new("no microphone"));
///
/// let mut conversation = Conversation::new(&config, transport, capture, playback);
/// let handle = conversation.handle();
/// let view = conversation.view();
/// tokio::spawn(conversation.run());
///
/// handle.submit_text("hello");
/// # let _ = view;
/// # }
/// ```
pub struct Conversation {
    state: SharedConversation,
    transport: Arc<dyn ChatTransport>,
    capture: Box<dyn SpeechCapture>,
    playback: SpeechPlayback,
    timeout: std::time::Duration,
    fallback_message: String,

    /// Strong sender handed out through [`ConversationHandle`]; `None` once
    /// the handle has been created so only handles keep the channel open.
    handle_tx: Option<mpsc::UnboundedSender<Event>>,
    /// Used by background work to report back without keeping the channel
    /// alive.
    self_tx: mpsc::WeakUnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,

    next_token: u64,
    pending: Option<PendingRequest>,
    next_session: u64,
    listening: Option<u64>,
    visible: bool,
}

impl Conversation {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn ChatTransport>,
        capture: Box<dyn SpeechCapture>,
        mut playback: SpeechPlayback,
    ) -> Self {
        let mut state = ConversationState::new(config.voice.enabled);
        if let Some(greeting) = config.ui.greeting.as_deref().filter(|g| !g.trim().is_empty()) {
            state.push_turn(Role::Assistant, greeting);
        }
        if !config.voice.enabled {
            playback.mute();
        }

        let (tx, events) = mpsc::unbounded_channel();
        let self_tx = tx.downgrade();

        Self {
            state: Arc::new(Mutex::new(state)),
            transport,
            capture,
            playback,
            timeout: config.chat.timeout(),
            fallback_message: config.chat.fallback_message.clone(),
            handle_tx: Some(tx),
            self_tx,
            events,
            next_token: 0,
            pending: None,
            next_session: 0,
            listening: None,
            visible: true,
        }
    }

    /// Sender for intents and lifecycle events.
    ///
    /// The first call moves the controller's own strong sender into the
    /// handle; later calls clone from the weak side, so this must be called
    /// before the loop is started.
    pub fn handle(&mut self) -> ConversationHandle {
        let tx = match self.handle_tx.take() {
            Some(tx) => tx,
            None => match self.self_tx.upgrade() {
                Some(tx) => tx,
                // Every handle is gone: the returned one is already closed.
                None => mpsc::unbounded_channel().0,
            },
        };
        ConversationHandle { tx }
    }

    /// Read-only access for the widget.
    pub fn view(&self) -> ConversationView {
        ConversationView::new(Arc::clone(&self.state))
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Handle events until [`Event::Shutdown`] or until every
    /// [`ConversationHandle`] has been dropped.
    pub async fn run(mut self) {
        // Without a handle nobody can ever send an intent.
        self.handle_tx = None;
        while self.step().await == Flow::Continue {}
        self.release(true);
        log::info!("conversation: controller stopped");
    }

    /// Wait for the next event and handle it.
    pub async fn step(&mut self) -> Flow {
        match self.events.recv().await {
            Some(event) => self.dispatch(event),
            None => Flow::Stop,
        }
    }

    /// Apply one event to the state machine.
    pub fn dispatch(&mut self, event: Event) -> Flow {
        match event {
            Event::Intent(Intent::SubmitText(text)) => self.submit_text(&text),
            Event::Intent(Intent::ToggleMic) => self.toggle_mic(),
            Event::Intent(Intent::ToggleVoiceOutput) => self.toggle_voice_output(),
            Event::Shown => self.visible = true,
            Event::Hidden => {
                log::debug!("conversation: widget hidden");
                self.visible = false;
                self.release(false);
            }
            Event::Shutdown => {
                log::info!("conversation: shutdown requested");
                self.release(true);
                return Flow::Stop;
            }
            Event::Capture { session, event } => self.capture_finished(session, event),
            Event::ChatCompleted { token, result } => self.chat_completed(token, result),
        }
        Flow::Continue
    }

    // -----------------------------------------------------------------------
    // Intent handlers
    // -----------------------------------------------------------------------

    fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            log::debug!("conversation: ignoring blank submission");
            return;
        }

        match self.status() {
            Status::AwaitingResponse => {
                log::debug!("conversation: request in flight, submission rejected");
            }
            Status::Listening => {
                // Typed text wins over the dictation in progress.
                self.stop_listening();
                self.begin_request(text);
            }
            Status::Idle | Status::Error => self.begin_request(text),
        }
    }

    fn toggle_mic(&mut self) {
        match self.status() {
            Status::Listening => {
                self.stop_listening();
                lock(&self.state).set_status(Status::Idle);
            }
            Status::AwaitingResponse => {
                log::debug!("conversation: request in flight, microphone toggle rejected");
            }
            Status::Idle | Status::Error => self.start_listening(),
        }
    }

    fn toggle_voice_output(&mut self) {
        let enabled = {
            let mut st = lock(&self.state);
            let enabled = !st.voice_output_enabled();
            st.set_voice_output(enabled);
            enabled
        };
        if enabled {
            self.playback.unmute();
        } else {
            self.playback.mute();
        }
        log::debug!("conversation: voice output {}", if enabled { "on" } else { "off" });
    }

    // -----------------------------------------------------------------------
    // Chat requests
    // -----------------------------------------------------------------------

    fn begin_request(&mut self, text: &str) {
        self.next_token += 1;
        let token = self.next_token;

        {
            let mut st = lock(&self.state);
            st.set_notice(None);
            st.push_turn(Role::User, text);
            st.set_status(Status::AwaitingResponse);
        }

        let transport = Arc::clone(&self.transport);
        let reply_tx = self.self_tx.clone();
        let timeout = self.timeout;
        let message = text.to_string();

        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.send(&message)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };
            if let Some(tx) = reply_tx.upgrade() {
                let _ = tx.send(Event::ChatCompleted { token, result });
            }
        });

        log::debug!("conversation: request {token} sent");
        self.pending = Some(PendingRequest { token, task });
    }

    fn chat_completed(&mut self, token: u64, result: Result<Reply, TransportError>) {
        let current = self.pending.as_ref().is_some_and(|p| p.token == token);
        if !current || self.status() != Status::AwaitingResponse {
            log::debug!("conversation: discarding stale reply for request {token}");
            return;
        }
        self.pending = None;

        match result {
            Ok(reply) => {
                lock(&self.state).push_turn(Role::Assistant, reply.text.as_str());
                if self.visible && self.voice_output_enabled() {
                    self.playback.speak(&reply.text);
                }
            }
            Err(e) => {
                log::warn!("conversation: chat request failed: {e}");
                lock(&self.state).push_turn(Role::SystemError, self.fallback_message.as_str());
            }
        }
        lock(&self.state).set_status(Status::Idle);
    }

    // -----------------------------------------------------------------------
    // Dictation
    // -----------------------------------------------------------------------

    fn start_listening(&mut self) {
        self.next_session += 1;
        let session = self.next_session;
        let sink_tx = self.self_tx.clone();

        let sink = Box::new(move |event: CaptureEvent| {
            if let Some(tx) = sink_tx.upgrade() {
                let _ = tx.send(Event::Capture { session, event });
            }
        });

        match self.capture.start_dictation(sink) {
            Ok(()) => {
                self.listening = Some(session);
                let mut st = lock(&self.state);
                st.set_notice(None);
                st.set_status(Status::Listening);
            }
            Err(CaptureError::CapabilityUnavailable(reason)) => {
                log::warn!("conversation: voice input unavailable: {reason}");
                let notice = format!("Voice input isn't available: {reason}");
                let mut st = lock(&self.state);
                st.set_status(Status::Error);
                st.push_turn(Role::SystemError, notice.as_str());
                st.set_notice(Some(notice));
                st.set_status(Status::Idle);
            }
        }
    }

    fn stop_listening(&mut self) {
        if self.listening.take().is_some() {
            self.capture.stop_dictation();
        }
    }

    fn capture_finished(&mut self, session: u64, event: CaptureEvent) {
        if self.listening != Some(session) || self.status() != Status::Listening {
            log::debug!("conversation: discarding event from stale dictation {session}");
            return;
        }
        self.listening = None;

        match event {
            CaptureEvent::TranscriptReady(text) if !text.trim().is_empty() => {
                log::debug!("conversation: transcript ready ({} chars)", text.len());
                self.begin_request(text.trim());
            }
            CaptureEvent::TranscriptReady(_) => {
                lock(&self.state).set_status(Status::Idle);
            }
            CaptureEvent::RecognitionFailed(reason) => {
                log::info!("conversation: recognition failed: {reason:?}");
                lock(&self.state).set_status(Status::Idle);
            }
            CaptureEvent::RecognitionCancelled => {
                lock(&self.state).set_status(Status::Idle);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Stop dictation and playback.  With `abort_request` the in-flight
    /// request is cancelled too and its token can never match again.
    fn release(&mut self, abort_request: bool) {
        self.stop_listening();
        self.playback.cancel();

        if abort_request {
            if let Some(pending) = self.pending.take() {
                log::debug!("conversation: aborting request {}", pending.token);
                pending.task.abort();
            }
        }

        let mut st = lock(&self.state);
        if st.status() == Status::Listening || self.pending.is_none() {
            st.set_status(Status::Idle);
        }
    }

    fn status(&self) -> Status {
        lock(&self.state).status()
    }

    fn voice_output_enabled(&self) -> bool {
        lock(&self.state).voice_output_enabled()
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::speech::playback::recording::{playback, SpeechTrace};
    use crate::speech::{RecognitionFailure, TerminalSink, UnavailableCapture};

    // ── Test doubles ────────────────────────────────────────────────────

    #[derive(Clone)]
    enum Outcome {
        Reply(&'static str),
        Fail(TransportError),
        Hang,
    }

    /// Transport that records messages and answers with a fixed outcome,
    /// optionally waiting for a permit first.
    struct MockTransport {
        outcome: Outcome,
        sent: Arc<Mutex<Vec<String>>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockTransport {
        fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                sent: Arc::new(Mutex::new(Vec::new())),
                gate: None,
            }
        }

        fn gated(outcome: Outcome, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(outcome)
            }
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn send(&self, message: &str) -> Result<Reply, TransportError> {
            self.sent.lock().unwrap().push(message.to_string());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            match &self.outcome {
                Outcome::Reply(text) => Ok(Reply::new(*text)),
                Outcome::Fail(e) => Err(e.clone()),
                Outcome::Hang => std::future::pending().await,
            }
        }
    }

    /// Capture whose terminal event is fired by the test.
    #[derive(Clone, Default)]
    struct ScriptedCapture {
        sink: Arc<Mutex<Option<TerminalSink>>>,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl ScriptedCapture {
        fn fire(&self, event: CaptureEvent) {
            let sink = self.sink.lock().unwrap().take().expect("no dictation active");
            sink(event);
        }

        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    impl SpeechCapture for ScriptedCapture {
        fn start_dictation(&mut self, sink: TerminalSink) -> Result<(), CaptureError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop_dictation(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if let Some(sink) = self.sink.lock().unwrap().take() {
                sink(CaptureEvent::RecognitionCancelled);
            }
        }
    }

    struct Harness {
        conversation: Conversation,
        view: ConversationView,
        speech: SpeechTrace,
        capture: ScriptedCapture,
        sent: Arc<Mutex<Vec<String>>>,
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ui.greeting = None;
        config.voice.enabled = true;
        config.chat.timeout_secs = 1;
        config.chat.fallback_message = "Sorry, something went wrong.".into();
        config
    }

    fn harness_with(config: AppConfig, transport: MockTransport) -> Harness {
        let sent = Arc::clone(&transport.sent);
        let capture = ScriptedCapture::default();
        let (player, speech) = playback();
        let conversation =
            Conversation::new(&config, Arc::new(transport), Box::new(capture.clone()), player);
        let view = conversation.view();
        Harness {
            conversation,
            view,
            speech,
            capture,
            sent,
        }
    }

    fn harness(transport: MockTransport) -> Harness {
        harness_with(config(), transport)
    }

    impl Harness {
        fn intent(&mut self, intent: Intent) -> Flow {
            self.conversation.dispatch(Event::Intent(intent))
        }

        fn submit(&mut self, text: &str) -> Flow {
            self.intent(Intent::SubmitText(text.into()))
        }

        async fn next(&mut self) -> Flow {
            tokio::time::timeout(Duration::from_secs(5), self.conversation.step())
                .await
                .expect("no event within 5s")
        }

        fn transcript(&self) -> Vec<(Role, String)> {
            self.view
                .history()
                .iter()
                .map(|t| (t.role(), t.text().to_string()))
                .collect()
        }
    }

    // ── Text round trip ─────────────────────────────────────────────────

    #[tokio::test]
    async fn reply_is_appended_and_spoken() {
        let mut h = harness(MockTransport::new(Outcome::Reply("Hi there!")));

        h.submit("hello");
        assert_eq!(h.view.status(), Status::AwaitingResponse);
        assert_eq!(h.transcript(), vec![(Role::User, "hello".into())]);

        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(
            h.transcript(),
            vec![
                (Role::User, "hello".into()),
                (Role::Assistant, "Hi there!".into()),
            ]
        );
        assert_eq!(h.speech.spoken(), vec!["Hi there!".to_string()]);
        assert_eq!(*h.sent.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn reply_is_silent_when_voice_output_disabled() {
        let mut cfg = config();
        cfg.voice.enabled = false;
        let mut h = harness_with(cfg, MockTransport::new(Outcome::Reply("Hi there!")));

        h.submit("hello");
        h.next().await;

        assert_eq!(h.view.turn_count(), 2);
        assert!(h.speech.spoken().is_empty());
        assert!(!h.view.voice_output_enabled());
    }

    #[tokio::test]
    async fn blank_submission_is_a_no_op() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.submit("   ");

        assert_eq!(h.view.status(), Status::Idle);
        assert!(h.view.history().is_empty());
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitted_text_is_trimmed() {
        let mut h = harness(MockTransport::new(Outcome::Reply("ok")));

        h.submit("  book a bike \n");
        h.next().await;

        assert_eq!(h.transcript()[0], (Role::User, "book a bike".into()));
        assert_eq!(*h.sent.lock().unwrap(), vec!["book a bike".to_string()]);
    }

    #[tokio::test]
    async fn transport_failure_appends_fallback_message() {
        let mut h = harness(MockTransport::new(Outcome::Fail(TransportError::ServerError(500))));

        h.submit("hello");
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(
            h.transcript(),
            vec![
                (Role::User, "hello".into()),
                (Role::SystemError, "Sorry, something went wrong.".into()),
            ]
        );
        assert!(!h.transcript()[1].1.contains("500"));
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn request_timeout_is_reported_as_failure() {
        let mut h = harness(MockTransport::new(Outcome::Hang));

        h.submit("hello");
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(h.transcript()[1].0, Role::SystemError);
    }

    #[tokio::test]
    async fn second_submission_while_awaiting_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(MockTransport::gated(Outcome::Reply("pong"), Arc::clone(&gate)));

        h.submit("first");
        h.submit("ping");
        assert_eq!(h.view.status(), Status::AwaitingResponse);
        assert_eq!(h.view.turn_count(), 1);

        gate.add_permits(1);
        h.next().await;

        assert_eq!(
            h.transcript(),
            vec![(Role::User, "first".into()), (Role::Assistant, "pong".into())]
        );
        assert_eq!(*h.sent.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn turns_alternate_and_ids_increase() {
        let mut h = harness(MockTransport::new(Outcome::Reply("sure")));

        for text in ["one", "two", "three"] {
            h.submit(text);
            h.next().await;
        }

        let history = h.view.history();
        assert_eq!(history.len(), 6);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role(), Role::User);
            assert_eq!(pair[1].role(), Role::Assistant);
        }
        assert!(history.windows(2).all(|w| w[0].id() < w[1].id()));
    }

    #[tokio::test]
    async fn stale_completion_is_ignored() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.conversation.dispatch(Event::ChatCompleted {
            token: 42,
            result: Ok(Reply::new("late")),
        });

        assert_eq!(h.view.status(), Status::Idle);
        assert!(h.view.history().is_empty());
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn completion_for_another_request_is_ignored_while_awaiting() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(MockTransport::gated(Outcome::Reply("real"), Arc::clone(&gate)));

        h.submit("first");
        h.conversation.dispatch(Event::ChatCompleted {
            token: 7,
            result: Ok(Reply::new("stale")),
        });

        assert_eq!(h.view.status(), Status::AwaitingResponse);
        assert_eq!(h.transcript(), vec![(Role::User, "first".into())]);
        assert!(h.speech.spoken().is_empty());

        gate.add_permits(1);
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(
            h.transcript(),
            vec![(Role::User, "first".into()), (Role::Assistant, "real".into())]
        );
        assert_eq!(h.speech.spoken(), vec!["real".to_string()]);
    }

    #[tokio::test]
    async fn greeting_seeds_history() {
        let mut cfg = config();
        cfg.ui.greeting = Some("Hi! Speak or type to me.".into());
        let h = harness_with(cfg, MockTransport::new(Outcome::Reply("unused")));

        assert_eq!(
            h.transcript(),
            vec![(Role::Assistant, "Hi! Speak or type to me.".into())]
        );
        assert!(h.speech.spoken().is_empty());
    }

    // ── Dictation ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn transcript_is_submitted_automatically() {
        let mut h = harness(MockTransport::new(Outcome::Reply("Booked.")));

        h.intent(Intent::ToggleMic);
        assert_eq!(h.view.status(), Status::Listening);

        h.capture.fire(CaptureEvent::TranscriptReady("book a bike".into()));
        h.next().await;
        assert_eq!(h.view.status(), Status::AwaitingResponse);

        h.next().await;
        assert_eq!(
            h.transcript(),
            vec![
                (Role::User, "book a bike".into()),
                (Role::Assistant, "Booked.".into()),
            ]
        );
        assert_eq!(h.view.status(), Status::Idle);
    }

    #[tokio::test]
    async fn mic_toggled_twice_returns_to_idle_without_turns() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.intent(Intent::ToggleMic);
        h.intent(Intent::ToggleMic);

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(h.capture.starts(), 1);
        assert_eq!(h.capture.stops(), 1);

        // The cancellation delivered by stop is stale by the time it arrives.
        h.next().await;
        assert_eq!(h.view.status(), Status::Idle);
        assert!(h.view.history().is_empty());
    }

    #[tokio::test]
    async fn recognition_failure_returns_to_idle_silently() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.intent(Intent::ToggleMic);
        h.capture
            .fire(CaptureEvent::RecognitionFailed(RecognitionFailure::NoSpeech));
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert!(h.view.history().is_empty());
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_transcript_sends_nothing() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.intent(Intent::ToggleMic);
        h.capture.fire(CaptureEvent::TranscriptReady("  ".into()));
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert!(h.view.history().is_empty());
    }

    #[tokio::test]
    async fn mic_toggle_is_rejected_while_awaiting() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(MockTransport::gated(Outcome::Reply("ok"), gate));

        h.submit("hello");
        h.intent(Intent::ToggleMic);

        assert_eq!(h.view.status(), Status::AwaitingResponse);
        assert_eq!(h.capture.starts(), 0);
    }

    #[tokio::test]
    async fn typed_submission_while_listening_stops_dictation() {
        let mut h = harness(MockTransport::new(Outcome::Reply("ok")));

        h.intent(Intent::ToggleMic);
        h.submit("typed instead");

        assert_eq!(h.capture.stops(), 1);
        assert_eq!(h.view.status(), Status::AwaitingResponse);

        // Cancellation from the stopped session, then the reply.
        h.next().await;
        assert_eq!(h.view.status(), Status::AwaitingResponse);
        h.next().await;
        assert_eq!(
            h.transcript(),
            vec![(Role::User, "typed instead".into()), (Role::Assistant, "ok".into())]
        );
    }

    #[tokio::test]
    async fn unavailable_microphone_surfaces_notice() {
        let (player, _speech) = playback();
        let mut conversation = Conversation::new(
            &config(),
            Arc::new(MockTransport::new(Outcome::Reply("unused"))),
            Box::new(UnavailableCapture::new("no input device")),
            player,
        );
        let view = conversation.view();

        conversation.dispatch(Event::Intent(Intent::ToggleMic));

        assert_eq!(view.status(), Status::Idle);
        let notice = view.notice().expect("notice set");
        assert!(notice.contains("no input device"));
        let history = view.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::SystemError);
    }

    // ── Voice output ────────────────────────────────────────────────────

    #[tokio::test]
    async fn disabling_voice_output_silences_current_reply() {
        let mut h = harness(MockTransport::new(Outcome::Reply("a long answer")));

        h.submit("hello");
        h.next().await;
        assert_eq!(h.speech.audible(), vec!["a long answer".to_string()]);

        h.intent(Intent::ToggleVoiceOutput);

        assert!(h.speech.audible().is_empty());
        assert!(!h.view.voice_output_enabled());
    }

    #[tokio::test]
    async fn reenabled_voice_output_speaks_next_reply() {
        let mut h = harness(MockTransport::new(Outcome::Reply("again")));

        h.intent(Intent::ToggleVoiceOutput);
        h.intent(Intent::ToggleVoiceOutput);
        h.submit("hello");
        h.next().await;

        assert_eq!(h.speech.spoken(), vec!["again".to_string()]);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn hidden_stops_dictation_and_playback_but_keeps_request() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(MockTransport::gated(Outcome::Reply("later"), Arc::clone(&gate)));

        h.submit("hello");
        h.conversation.dispatch(Event::Hidden);
        assert_eq!(h.view.status(), Status::AwaitingResponse);

        gate.add_permits(1);
        h.next().await;

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(h.transcript()[1], (Role::Assistant, "later".into()));
        // Not spoken while hidden.
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn hidden_while_listening_returns_to_idle() {
        let mut h = harness(MockTransport::new(Outcome::Reply("unused")));

        h.intent(Intent::ToggleMic);
        h.conversation.dispatch(Event::Hidden);

        assert_eq!(h.capture.stops(), 1);
        assert_eq!(h.view.status(), Status::Idle);
    }

    #[tokio::test]
    async fn shutdown_releases_everything() {
        let mut h = harness(MockTransport::new(Outcome::Reply("spoken")));

        h.submit("hello");
        h.next().await;
        h.intent(Intent::ToggleMic);
        assert_eq!(h.speech.audible(), vec!["spoken".to_string()]);

        let flow = h.conversation.dispatch(Event::Shutdown);

        assert_eq!(flow, Flow::Stop);
        assert_eq!(h.capture.stops(), 1);
        assert!(h.speech.audible().is_empty());
        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(h.view.turn_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_drops_in_flight_request() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(MockTransport::gated(Outcome::Reply("too late"), Arc::clone(&gate)));

        h.submit("hello");
        h.conversation.dispatch(Event::Shutdown);
        gate.add_permits(1);

        assert_eq!(h.view.status(), Status::Idle);
        assert_eq!(h.transcript(), vec![(Role::User, "hello".into())]);
    }

    #[tokio::test]
    async fn run_ends_when_handles_are_dropped() {
        let (player, _speech) = playback();
        let mut conversation = Conversation::new(
            &config(),
            Arc::new(MockTransport::new(Outcome::Reply("unused"))),
            Box::new(ScriptedCapture::default()),
            player,
        );
        let handle = conversation.handle();
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), conversation.run())
            .await
            .expect("run should end once every handle is gone");
    }

    #[tokio::test]
    async fn handle_drives_the_loop() {
        let (player, _speech) = playback();
        let mut conversation = Conversation::new(
            &config(),
            Arc::new(MockTransport::new(Outcome::Reply("unused"))),
            Box::new(ScriptedCapture::default()),
            player,
        );
        let handle = conversation.handle();
        let view = conversation.view();

        handle.toggle_voice_output();
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), conversation.run())
            .await
            .expect("shutdown ends the loop");

        assert!(!view.voice_output_enabled());
        // The loop is gone; further intents are dropped without panicking.
        handle.submit_text("anyone there?");
    }
}
