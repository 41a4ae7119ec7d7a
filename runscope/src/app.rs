//! Application state for the TUI.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::TableState;
use runscope_core::replay::Recorder;
use runscope_core::{
    dispatch, ConnectionEvent, Location, Outcome, Preferences, RequestSink, RunId, Selection,
    ViewerState,
};

/// Upper bound on how long the main loop sleeps waiting for input.
const TICK: Duration = Duration::from_millis(100);

/// Lines moved by page up/down.
const PAGE: usize = 10;

/// Which pane receives navigation keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Runs,
    Messages,
}

/// State of the server channel, as last reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected(String),
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    GaveUp {
        attempts: u32,
    },
}

impl ConnectionStatus {
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Connecting => "connecting".to_string(),
            ConnectionStatus::Connected => "connected".to_string(),
            ConnectionStatus::Disconnected(reason) => format!("disconnected: {reason}"),
            ConnectionStatus::Reconnecting { attempt, delay } => {
                format!("retry {attempt} in {:.1}s", delay.as_secs_f64())
            }
            ConnectionStatus::GaveUp { attempts } => format!("gave up after {attempts} attempts"),
        }
    }
}

/// Main application state.
pub struct App {
    /// Runs, selection and the reconstructed trace
    pub state: ViewerState,
    sink: Box<dyn RequestSink>,
    location: Location,
    preferences: Preferences,
    /// Where preferences are persisted; `None` keeps them in memory.
    preferences_path: Option<PathBuf>,
    recorder: Option<Recorder>,
    /// Connection status shown in the header
    pub status: ConnectionStatus,
    /// Whether the run list is shown
    pub sidebar_open: bool,
    pub focus: Focus,
    /// Run under the cursor in the sidebar
    pub highlighted: Option<RunId>,
    /// Table state for the run list
    pub table_state: TableState,
    /// Scroll offset of the message pane
    pub scroll_offset: usize,
    /// Keep the message pane pinned to the newest content
    pub auto_scroll: bool,
    /// Last error worth showing in the footer
    pub last_error: Option<String>,
    /// Why the app stopped on its own, if it did
    pub exit_reason: Option<String>,
    /// Whether the app should quit
    pub should_quit: bool,
}

impl App {
    pub fn new(sink: Box<dyn RequestSink>, location: Location, debounce: Duration) -> Self {
        Self {
            state: ViewerState::new(debounce),
            sink,
            location,
            preferences: Preferences::default(),
            preferences_path: None,
            recorder: None,
            status: ConnectionStatus::default(),
            sidebar_open: true,
            focus: Focus::Runs,
            highlighted: None,
            table_state: TableState::default(),
            scroll_offset: 0,
            auto_scroll: true,
            last_error: None,
            exit_reason: None,
            should_quit: false,
        }
    }

    /// Use persisted preferences; the follow flag takes effect immediately.
    pub fn with_preferences(mut self, preferences: Preferences, path: PathBuf) -> Self {
        self.state.set_follow(preferences.follow_new_runs);
        self.preferences = preferences;
        self.preferences_path = Some(path);
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Location of the run being viewed (`<url>#<run id>`).
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Open `run_id` immediately, as for a deep link.
    pub fn open_run(&mut self, run_id: RunId) {
        self.highlighted = Some(run_id);
        if let Some(selection) = self.state.select_now(run_id) {
            self.subscribe(selection);
        }
    }

    // ========== Connection ==========

    pub fn handle_connection_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Connected => {
                self.status = ConnectionStatus::Connected;
                self.last_error = None;
                if let Some(selection) = self.state.on_connected() {
                    self.subscribe(selection);
                }
            }
            ConnectionEvent::Frame(text) => self.handle_frame(&text, now),
            ConnectionEvent::Disconnected { reason } => {
                self.status = ConnectionStatus::Disconnected(reason);
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                self.status = ConnectionStatus::Reconnecting { attempt, delay };
            }
            ConnectionEvent::GaveUp { attempts } => {
                self.status = ConnectionStatus::GaveUp { attempts };
                self.exit_reason = Some(format!(
                    "gave up connecting to {} after {attempts} attempts",
                    self.location.endpoint()
                ));
                self.should_quit = true;
            }
        }
    }

    fn handle_frame(&mut self, text: &str, now: Instant) {
        let outcome = dispatch(&mut self.state, text, now);
        if let Some(recorder) = &self.recorder {
            recorder.record_outcome(&outcome, text);
        }
        if let Outcome::Applied { .. } = outcome {
            if self.highlighted.is_none() {
                self.highlighted = self.state.registry().runs_newest_first().first().map(|r| r.id);
            }
        }
    }

    // ========== Timers ==========

    /// Run due timers. Call once per loop iteration.
    pub fn tick(&mut self, now: Instant) {
        if let Some(selection) = self.state.tick(now) {
            self.subscribe(selection);
        }
    }

    /// How long the loop may block on input without missing a timer.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        match self.state.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(TICK),
            None => TICK,
        }
    }

    fn subscribe(&mut self, selection: Selection) {
        tracing::debug!(
            run_id = selection.run_id,
            epoch = selection.epoch,
            "Subscribing"
        );
        self.highlighted = Some(selection.run_id);
        self.scroll_offset = 0;

        if let Err(e) = self.sink.send_request(&selection.request()) {
            tracing::warn!(run_id = selection.run_id, error = %e, "Subscription not sent");
            self.last_error = Some(format!("run {}: {e}", selection.run_id));
        }

        self.location = self.location.with_run(selection.run_id);
        self.preferences.last_location = Some(self.location.to_string());
        self.save_preferences();
    }

    fn save_preferences(&self) {
        if let Some(path) = &self.preferences_path {
            self.preferences.save_or_warn(path);
        }
    }

    // ========== Keys ==========

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        self.handle_key_at(key, Instant::now());
    }

    pub fn handle_key_at(&mut self, key: KeyEvent, now: Instant) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('s') => self.toggle_sidebar(),
            KeyCode::Tab => self.toggle_focus(),
            KeyCode::Char('f') => self.toggle_follow(),
            KeyCode::Char(' ') => self.auto_scroll = !self.auto_scroll,
            KeyCode::Down | KeyCode::Char('j') => match self.focus {
                Focus::Runs => self.highlight_next(now),
                Focus::Messages => self.scroll_down(1),
            },
            KeyCode::Up | KeyCode::Char('k') => match self.focus {
                Focus::Runs => self.highlight_previous(now),
                Focus::Messages => self.scroll_up(1),
            },
            KeyCode::PageDown | KeyCode::Char('d') => self.scroll_down(PAGE),
            KeyCode::PageUp | KeyCode::Char('u') => self.scroll_up(PAGE),
            KeyCode::Home | KeyCode::Char('g') => {
                self.auto_scroll = false;
                self.scroll_offset = 0;
            }
            KeyCode::End | KeyCode::Char('G') => self.auto_scroll = true,
            KeyCode::Enter => {
                if let Some(run_id) = self.highlighted {
                    self.state.select_run(run_id, now);
                }
            }
            _ => {}
        }
    }

    fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
        self.focus = if self.sidebar_open {
            Focus::Runs
        } else {
            Focus::Messages
        };
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Runs => Focus::Messages,
            Focus::Messages if self.sidebar_open => Focus::Runs,
            Focus::Messages => Focus::Messages,
        };
    }

    fn toggle_follow(&mut self) {
        let follow = !self.state.follow();
        self.state.set_follow(follow);
        self.preferences.follow_new_runs = follow;
        self.save_preferences();
        tracing::info!(follow, "Follow new runs toggled");
    }

    /// Index of the highlighted run in newest-first order.
    pub fn highlighted_index(&self) -> Option<usize> {
        let run_id = self.highlighted?;
        self.state
            .registry()
            .runs_newest_first()
            .iter()
            .position(|run| run.id == run_id)
    }

    fn highlight_next(&mut self, now: Instant) {
        self.move_highlight(1, now);
    }

    fn highlight_previous(&mut self, now: Instant) {
        self.move_highlight(-1, now);
    }

    /// Move the cursor with wrap-around and request a debounced switch.
    fn move_highlight(&mut self, step: isize, now: Instant) {
        let runs = self.state.registry().runs_newest_first();
        if runs.is_empty() {
            return;
        }
        let len = runs.len() as isize;
        let index = match self.highlighted_index() {
            Some(i) => (i as isize + step).rem_euclid(len),
            None => 0,
        };
        let run_id = runs[index as usize].id;

        self.highlighted = Some(run_id);
        self.state.select_run(run_id, now);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    fn scroll_up(&mut self, lines: usize) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }
}
