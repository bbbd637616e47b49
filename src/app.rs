use std::time::{Duration, Instant};

use crate::panel::{PanelEvent, PanelState, SessionState};
use crate::text_layout::wrap_word_with_positions;

pub const COMMAND_INDEX: [(&str, &str); 7] = [
    ("/stop", "Stop the running generation"),
    ("/clear", "Clear the chat"),
    ("/restart", "Restart from message <n>"),
    ("/open", "Open the code of message <n>"),
    ("/junit", "Change the JUnit version"),
    ("/quit", "Quit app"),
    ("/exit", "Quit app"),
];

/// What the main loop has to do after the user pressed Enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Generate(String),
    JunitVersion(String),
    Quit,
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    panel: PanelState,
    target_label: String,
    chat_input: String,
    chat_cursor: usize,
    chat_scroll: u16,
    last_manual_scroll: Option<Instant>,
    scroll_idle: Duration,
}

impl App {
    pub fn new(target_label: impl Into<String>, scroll_idle: Duration) -> Self {
        Self {
            running: true,
            ticks: 0,
            panel: PanelState::default(),
            target_label: target_label.into(),
            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            last_manual_scroll: None,
            scroll_idle,
        }
    }

    /// Resumes tail-following once the user has left the scroll alone for
    /// `scroll_idle`.
    pub fn on_tick(&mut self, now: Instant) {
        self.ticks = self.ticks.saturating_add(1);
        if let Some(at) = self.last_manual_scroll
            && now.saturating_duration_since(at) >= self.scroll_idle
        {
            self.last_manual_scroll = None;
            self.panel.unlock_scroll();
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn apply_panel_event(&mut self, event: PanelEvent) {
        self.panel.apply(event);
    }

    pub fn panel(&self) -> &PanelState {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut PanelState {
        &mut self.panel
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    pub fn request_stop(&mut self) -> bool {
        self.panel.request_stop()
    }

    pub fn input_char(&mut self, c: char) {
        let byte_idx = char_to_byte_idx(&self.chat_input, self.chat_cursor);
        self.chat_input.insert(byte_idx, c);
        self.chat_cursor = self.chat_cursor.saturating_add(1);
    }

    pub fn backspace_input(&mut self) {
        if self.chat_cursor == 0 {
            return;
        }
        let start = char_to_byte_idx(&self.chat_input, self.chat_cursor - 1);
        let end = char_to_byte_idx(&self.chat_input, self.chat_cursor);
        self.chat_input.drain(start..end);
        self.chat_cursor -= 1;
    }

    pub fn move_cursor_left(&mut self) {
        self.chat_cursor = self.chat_cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        let char_len = self.chat_input.chars().count();
        self.chat_cursor = (self.chat_cursor + 1).min(char_len);
    }

    pub fn move_cursor_home(&mut self) {
        self.chat_cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.chat_cursor = self.chat_input.chars().count();
    }

    pub fn chat_input(&self) -> &str {
        &self.chat_input
    }

    pub fn chat_cursor_line_col(&self, width: u16) -> (u16, u16) {
        let positions = wrap_word_with_positions(&self.chat_input, width.max(1)).positions;
        positions
            .get(self.chat_cursor)
            .copied()
            .unwrap_or_default()
    }

    pub fn scroll_chat_up(&mut self, lines: u16, now: Instant) {
        self.mark_manual_scroll(now);
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16, max_scroll: u16, now: Instant) {
        self.mark_manual_scroll(now);
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    fn mark_manual_scroll(&mut self, now: Instant) {
        self.last_manual_scroll = Some(now);
        self.panel.lock_scroll();
    }

    /// Scroll offset to render with; pinned to the bottom while following.
    pub fn effective_chat_scroll(&self, max_scroll: u16) -> u16 {
        if self.panel.follows_tail() {
            max_scroll
        } else {
            self.chat_scroll.min(max_scroll)
        }
    }

    /// Keeps the stored offset in step with what was rendered, so the first
    /// manual scroll starts from the visible position.
    pub fn sync_chat_scroll(&mut self, max_scroll: u16) {
        self.chat_scroll = self.effective_chat_scroll(max_scroll);
    }

    pub fn command_suggestions(&self) -> Vec<(&'static str, &'static str)> {
        let Some(query) = command_query(&self.chat_input) else {
            return Vec::new();
        };
        COMMAND_INDEX
            .iter()
            .copied()
            .filter(|(command, _)| command.starts_with(query))
            .collect()
    }

    /// Consumes the input line. Slash commands that only touch the panel are
    /// handled here; the rest come back to the caller.
    pub fn submit_input(&mut self) -> Option<Submission> {
        let message = self.chat_input.trim().to_string();
        self.chat_input.clear();
        self.chat_cursor = 0;
        if message.is_empty() {
            return None;
        }
        if !message.starts_with('/') {
            return self.submit_description(message);
        }

        let (command, argument) = match message.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (message.as_str(), ""),
        };
        match command {
            "/quit" | "/exit" => Some(Submission::Quit),
            "/stop" => {
                if !self.panel.request_stop() {
                    self.panel.push_notice("Nothing is running.".to_string());
                }
                None
            }
            "/clear" => {
                self.panel.request_clear();
                None
            }
            "/restart" => {
                match parse_index(argument) {
                    Some(index) if self.panel.request_restart(index) => {}
                    _ => self.panel.push_notice(format!("No message to restart at '{argument}'.")),
                }
                None
            }
            "/open" => {
                match parse_index(argument) {
                    Some(index) if self.panel.request_open_code(index) => {}
                    _ => self
                        .panel
                        .push_notice(format!("No code block in message '{argument}'.")),
                }
                None
            }
            "/junit" if !argument.is_empty() => Some(Submission::JunitVersion(argument.to_string())),
            "/junit" => {
                self.panel.push_notice("Usage: /junit <version>".to_string());
                None
            }
            other => {
                self.panel.push_notice(format!("Unknown command {other}"));
                None
            }
        }
    }

    fn submit_description(&mut self, message: String) -> Option<Submission> {
        match self.panel.session_state() {
            SessionState::Running | SessionState::Stopping => {
                self.panel
                    .push_notice("A generation is running. Use /stop first.".to_string());
                None
            }
            SessionState::Idle | SessionState::Stopped => {
                // A new generation always follows the tail.
                self.last_manual_scroll = None;
                self.panel.unlock_scroll();
                Some(Submission::Generate(message))
            }
        }
    }
}

fn parse_index(argument: &str) -> Option<usize> {
    argument.parse::<usize>().ok()
}

fn command_query(input: &str) -> Option<&str> {
    let trimmed = input.trim_start();
    if !trimmed.starts_with('/') || trimmed.contains(char::is_whitespace) {
        return None;
    }
    Some(trimmed)
}

fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(idx, _)| idx)
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
