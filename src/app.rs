//! Floating chat widget: egui/eframe application.
//!
//! # Architecture
//!
//! [`ChatWidget`] is the top-level [`eframe::App`].  It never changes the
//! conversation itself:
//!
//! * `view`   reads history, status and the voice toggle every frame.
//! * `handle` sends intents (submit, mic, voice) and lifecycle events
//!   (shown, hidden, shutdown) to the [`Conversation`] controller.
//!
//! The only state the widget owns is the draft in the text box, whether
//! the panel is open, and the window position saved to `settings.toml` on
//! exit.
//!
//! # Widget States
//!
//! | Status | Visual |
//! |--------|--------|
//! | `Idle` | History + input row, all buttons enabled |
//! | `Listening` | Mic button red, "Listening…" in the header |
//! | `AwaitingResponse` | Spinner in the header, send and mic disabled |
//! | Closed | Small launcher button only |
//!
//! [`Conversation`]: crate::conversation::Conversation

use std::path::{Path, PathBuf};
use std::time::Duration;

use eframe::egui;

use crate::config::AppConfig;
use crate::conversation::{ConversationHandle, ConversationView, Role, Status, Turn};

const OPEN_SIZE: egui::Vec2 = egui::vec2(340.0, 460.0);
const CLOSED_SIZE: egui::Vec2 = egui::vec2(72.0, 44.0);

// ---------------------------------------------------------------------------
// ChatWidget
// ---------------------------------------------------------------------------

/// eframe application: the floating assistant widget.
pub struct ChatWidget {
    view: ConversationView,
    handle: ConversationHandle,

    // ── Widget-local state ───────────────────────────────────────────────
    /// Text typed but not yet sent.
    draft: String,
    /// Panel expanded (`true`) or collapsed to the launcher.
    open: bool,
    /// Number of turns at the last frame, to scroll when new ones arrive.
    seen_turns: usize,
    /// Spinner animation phase (increases each frame).
    spinner_phase: f32,
    /// Top-left corner of the window at the last frame.
    position: Option<egui::Pos2>,

    // ── Configuration ────────────────────────────────────────────────────
    config: AppConfig,
    /// Where the window position is written on exit; `None` leaves the
    /// settings file untouched.
    settings_file: Option<PathBuf>,
}

impl ChatWidget {
    pub fn new(
        view: ConversationView,
        handle: ConversationHandle,
        config: AppConfig,
        settings_file: Option<PathBuf>,
    ) -> Self {
        Self {
            view,
            handle,
            draft: String::new(),
            open: true,
            seen_turns: 0,
            spinner_phase: 0.0,
            position: None,
            config,
            settings_file,
        }
    }

    // ── Intents ──────────────────────────────────────────────────────────

    fn submit_draft(&mut self) {
        if let Some(text) = take_submission(&mut self.draft) {
            self.handle.submit_text(text);
        }
    }

    fn set_open(&mut self, ctx: &egui::Context, open: bool) {
        if self.open == open {
            return;
        }
        self.open = open;
        if open {
            self.handle.shown();
        } else {
            self.handle.hidden();
        }
        let size = if open { OPEN_SIZE } else { CLOSED_SIZE };
        ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(size));
    }

    // ── Title bar ────────────────────────────────────────────────────────

    /// Draggable header with status, voice toggle and window controls.
    fn draw_title_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, status: Status) {
        ui.horizontal(|ui| {
            let title = ui.label(
                egui::RichText::new(self.config.ui.title.as_str())
                    .color(egui::Color32::from_rgb(220, 220, 220))
                    .strong()
                    .size(14.0),
            );
            drag_window(ctx, &title);

            let status_text = match status {
                Status::AwaitingResponse => format!("{} {}", self.spinner_char(), status.label()),
                _ => status.label().to_string(),
            };
            ui.label(
                egui::RichText::new(status_text)
                    .color(status_color(status))
                    .size(11.0),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if frameless_button(ui, "x", egui::Color32::from_rgb(200, 100, 100)).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                if frameless_button(ui, "-", egui::Color32::from_rgb(150, 150, 150)).clicked() {
                    self.set_open(ctx, false);
                }

                let voice_on = self.view.voice_output_enabled();
                let (label, color) = if voice_on {
                    ("voice on", egui::Color32::from_rgb(80, 200, 120))
                } else {
                    ("voice off", egui::Color32::from_rgb(130, 130, 130))
                };
                if frameless_button(ui, label, color)
                    .on_hover_text("Speak replies aloud")
                    .clicked()
                {
                    self.handle.toggle_voice_output();
                }
            });
        });
    }

    // ── History ──────────────────────────────────────────────────────────

    fn draw_history(&mut self, ui: &mut egui::Ui, history: &[Turn]) {
        let reserved = 64.0;
        let height = (ui.available_height() - reserved).max(80.0);
        let scroll_to_end = history.len() != self.seen_turns;
        self.seen_turns = history.len();

        egui::ScrollArea::vertical()
            .max_height(height)
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for turn in history {
                    draw_turn(ui, turn);
                    ui.add_space(4.0);
                }
                if scroll_to_end {
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
            });
    }

    // ── Input row ────────────────────────────────────────────────────────

    fn draw_input(&mut self, ui: &mut egui::Ui, status: Status, notice: Option<String>) {
        if let Some(notice) = notice {
            ui.label(
                egui::RichText::new(notice)
                    .color(egui::Color32::from_rgb(255, 136, 68))
                    .size(11.0),
            );
        }

        let busy = status.is_busy();
        let listening = status == Status::Listening;

        ui.horizontal(|ui| {
            let mic_enabled = self.config.speech.enabled;
            let button_width = if mic_enabled { 96.0 } else { 52.0 };
            let hint = if listening {
                "Listening…"
            } else {
                "Type a message"
            };
            let edit = ui.add_sized(
                [ui.available_width() - button_width, 24.0],
                egui::TextEdit::singleline(&mut self.draft).hint_text(hint),
            );
            let enter = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            let can_send = !busy && !self.draft.trim().is_empty();
            let send = ui.add_enabled(can_send, egui::Button::new("Send"));
            if can_send && (send.clicked() || enter) {
                self.submit_draft();
                edit.request_focus();
            }

            if mic_enabled {
                let mic_text = egui::RichText::new(if listening { "Stop" } else { "Mic" }).color(
                    if listening {
                        egui::Color32::from_rgb(255, 80, 80)
                    } else {
                        egui::Color32::from_rgb(200, 200, 200)
                    },
                );
                let mic = ui
                    .add_enabled(!busy, egui::Button::new(mic_text))
                    .on_hover_text("Dictate a message");
                if mic.clicked() {
                    self.handle.toggle_mic();
                }
            }
        });
    }

    // ── Launcher ─────────────────────────────────────────────────────────

    fn draw_launcher(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.centered_and_justified(|ui| {
            let launcher = ui.add(egui::Button::new(
                egui::RichText::new("Chat")
                    .color(egui::Color32::from_rgb(220, 220, 220))
                    .size(13.0),
            ));
            drag_window(ctx, &launcher);
            if launcher.clicked() {
                self.set_open(ctx, true);
            }
        });
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn spinner_char(&self) -> char {
        let chars = ['|', '/', '-', '\\'];
        chars[(self.spinner_phase as usize) % chars.len()]
    }
}

/// Take the trimmed draft for sending, leaving the box empty.  Blank drafts
/// are left in place and nothing is sent.
fn take_submission(draft: &mut String) -> Option<String> {
    let text = draft.trim();
    if text.is_empty() {
        return None;
    }
    let text = text.to_string();
    draft.clear();
    Some(text)
}

/// Record `position` in `config` and write the file.  Nothing is written
/// when the position was never observed.
fn save_position(
    config: &mut AppConfig,
    position: Option<egui::Pos2>,
    path: &Path,
) -> anyhow::Result<()> {
    let Some(pos) = position else {
        return Ok(());
    };
    config.ui.window_position = Some((pos.x, pos.y));
    config.save_to(path)
}

fn draw_turn(ui: &mut egui::Ui, turn: &Turn) {
    let (fill, align) = match turn.role() {
        Role::User => (egui::Color32::from_rgb(45, 85, 160), egui::Align::Max),
        Role::Assistant => (egui::Color32::from_rgb(55, 55, 60), egui::Align::Min),
        Role::SystemError => (egui::Color32::from_rgb(110, 50, 30), egui::Align::Min),
    };
    ui.with_layout(egui::Layout::top_down(align), |ui| {
        egui::Frame::new()
            .fill(fill)
            .corner_radius(egui::CornerRadius::same(6))
            .inner_margin(egui::Margin::symmetric(8, 4))
            .show(ui, |ui| {
                ui.set_max_width(OPEN_SIZE.x * 0.75);
                ui.label(
                    egui::RichText::new(turn.text())
                        .color(egui::Color32::from_rgb(235, 235, 235))
                        .size(13.0),
                );
            });
    });
}

fn frameless_button(ui: &mut egui::Ui, text: &str, color: egui::Color32) -> egui::Response {
    ui.add(egui::Button::new(egui::RichText::new(text).color(color).size(12.0)).frame(false))
}

/// Move the borderless window while `response` is being dragged.
fn drag_window(ctx: &egui::Context, response: &egui::Response) {
    if response.is_pointer_button_down_on() {
        if let Some(outer_rect) = ctx.input(|i| i.viewport().outer_rect) {
            let delta = ctx.input(|i| i.pointer.delta());
            ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(outer_rect.min + delta));
        }
    }
}

fn status_color(status: Status) -> egui::Color32 {
    match status {
        Status::Idle => egui::Color32::from_rgb(120, 120, 120),
        Status::Listening => egui::Color32::from_rgb(255, 68, 68),
        Status::AwaitingResponse => egui::Color32::from_rgb(68, 136, 255),
        Status::Error => egui::Color32::from_rgb(255, 136, 68),
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for ChatWidget {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (status, history, notice) =
            self.view.read(|s| (s.status(), s.history().to_vec(), s.notice().map(str::to_string)));

        if let Some(rect) = ctx.input(|i| i.viewport().outer_rect) {
            self.position = Some(rect.min);
        }

        self.spinner_phase += 0.08;
        if self.spinner_phase >= 4.0 {
            self.spinner_phase = 0.0;
        }

        // The controller changes state off the UI thread; poll for it.
        let repaint = match status {
            Status::AwaitingResponse => Duration::from_millis(66),
            Status::Listening => Duration::from_millis(100),
            Status::Idle | Status::Error => Duration::from_millis(250),
        };
        ctx.request_repaint_after(repaint);

        let frame = egui::Frame::new()
            .fill(egui::Color32::from_rgba_premultiplied(30, 30, 30, 230))
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8));

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            if !self.open {
                self.draw_launcher(ui, ctx);
                return;
            }
            self.draw_title_bar(ui, ctx, status);
            ui.separator();
            self.draw_history(ui, &history);
            ui.separator();
            self.draw_input(ui, status, notice);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("assistant widget closing");
        self.handle.shutdown();

        if let Some(path) = &self.settings_file {
            if let Err(e) = save_position(&mut self.config, self.position, path) {
                log::warn!("could not save window position: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
