//! Panel-side render state machine and the structured messages exchanged
//! between the host and the panel.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::wire::Role;

const WAIT_SUFFIX: &str = "-wait";
const STOP_ACK_TEXT: &str = "Stopping generation...";
const MAX_NOTICES: usize = 50;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").expect("code block pattern")
});

/// Session state as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedState {
    Idle,
    Running,
    Stopped,
}

/// Host → panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Turn {
        role: Role,
        content: String,
        sender_type: Option<String>,
        index: Option<usize>,
    },
    Typing {
        role: Role,
        content: String,
    },
    SessionState {
        state: ReportedState,
        message: Option<String>,
    },
    Clear {
        to_index: usize,
    },
    Error {
        message: String,
    },
    Notice {
        message: String,
    },
}

impl PanelEvent {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Turn {
                role,
                content,
                sender_type,
                index,
            } => {
                let mut value = json!({ "role": role.as_str(), "content": content });
                if let Some(sender_type) = sender_type {
                    value["senderType"] = json!(sender_type);
                }
                if let Some(index) = index {
                    value["index"] = json!(index);
                }
                value
            }
            Self::Typing { role, content } => {
                json!({ "role": format!("{role}{WAIT_SUFFIX}"), "content": content })
            }
            Self::SessionState { state, message } => {
                let mut value = json!({ "cmd": "session-state", "state": state });
                if let Some(message) = message {
                    value["message"] = json!(message);
                }
                value
            }
            Self::Clear { to_index } => json!({ "cmd": "clear", "toIndex": to_index }),
            Self::Error { message } => json!({ "cmd": "error", "message": message }),
            Self::Notice { message } => json!({ "cmd": "notice", "message": message }),
        }
    }
}

/// Panel → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum PanelCommand {
    OpenCode { content: String, lang: String },
    ClearChat,
    StopRun,
    RestartSession { number: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Empty-state banner shown when no turn is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Hidden,
    Default,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTurn {
    pub index: usize,
    pub role: Role,
    pub header: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingPlaceholder {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub session_state: SessionState,
    pub scroll_locked: bool,
    pub rendered_message_count: usize,
    pub has_typing_placeholder: bool,
}

#[derive(Debug)]
pub struct PanelState {
    session_state: SessionState,
    scroll_locked: bool,
    turns: Vec<RenderedTurn>,
    /// Panel position of turn 0 of the current generation.
    generation_base: usize,
    typing: Option<TypingPlaceholder>,
    banner: Banner,
    notices: Vec<String>,
    outbox: Vec<PanelCommand>,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            session_state: SessionState::Idle,
            scroll_locked: false,
            turns: Vec::new(),
            generation_base: 0,
            typing: None,
            banner: Banner::Default,
            notices: Vec::new(),
            outbox: Vec::new(),
        }
    }
}

impl PanelState {
    pub fn apply(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Turn {
                role,
                content,
                sender_type,
                index,
            } => self.render_turn(role, content, sender_type, index),
            PanelEvent::Typing { role, content } => self.show_typing(role, content),
            PanelEvent::SessionState { state, message } => {
                let next = match state {
                    ReportedState::Idle => SessionState::Idle,
                    ReportedState::Running => SessionState::Running,
                    ReportedState::Stopped => SessionState::Stopped,
                };
                self.transition(next);
                if let Some(message) = message.filter(|text| !text.trim().is_empty()) {
                    self.push_notice(message);
                }
            }
            PanelEvent::Clear { to_index } => self.clear_to(to_index),
            PanelEvent::Error { message } => self.push_notice(format!("Error: {message}")),
            PanelEvent::Notice { message } => self.push_notice(message),
        }
    }

    fn render_turn(
        &mut self,
        role: Role,
        content: String,
        sender_type: Option<String>,
        index: Option<usize>,
    ) {
        // Turn indices count from the start of the current generation.
        if let Some(index) = index {
            let position = self.generation_base + index;
            if position < self.turns.len() {
                self.turns.truncate(position);
            }
        }
        // The placeholder row becomes this turn instead of sitting beside it.
        self.typing = None;
        self.banner = Banner::Hidden;
        let header = capitalize(sender_type.as_deref().unwrap_or(role.as_str()));
        self.turns.push(RenderedTurn {
            index: self.turns.len(),
            role,
            header,
            content,
        });
    }

    fn show_typing(&mut self, role: Role, content: String) {
        if self.session_state != SessionState::Running {
            debug!(%role, "dropping typing placeholder outside a running session");
            return;
        }
        self.banner = Banner::Hidden;
        self.typing = Some(TypingPlaceholder { role, content });
    }

    fn transition(&mut self, next: SessionState) {
        let previous = self.session_state;
        if previous == SessionState::Running && next != SessionState::Running {
            self.typing = None;
        }
        if previous != SessionState::Running && next == SessionState::Running {
            self.generation_base = self.turns.len();
        }
        self.session_state = next;
        if self.turns.is_empty() && self.typing.is_none() {
            self.banner = self.empty_banner();
        }
        debug!(?previous, ?next, "panel session state");
    }

    fn clear_to(&mut self, to_index: usize) {
        self.turns.truncate(to_index);
        self.generation_base = self.generation_base.min(self.turns.len());
        self.typing = None;
        if self.turns.is_empty() {
            self.banner = self.empty_banner();
        }
    }

    fn empty_banner(&self) -> Banner {
        match self.session_state {
            SessionState::Running | SessionState::Stopping => Banner::Waiting,
            SessionState::Idle | SessionState::Stopped => Banner::Default,
        }
    }

    pub fn push_notice(&mut self, message: String) {
        self.notices.push(message);
        if self.notices.len() > MAX_NOTICES {
            let overflow = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..overflow);
        }
    }

    /// User asked to stop. Only meaningful while running.
    pub fn request_stop(&mut self) -> bool {
        if self.session_state != SessionState::Running {
            return false;
        }
        self.transition(SessionState::Stopping);
        self.push_notice(STOP_ACK_TEXT.to_string());
        self.outbox.push(PanelCommand::StopRun);
        true
    }

    pub fn request_clear(&mut self) {
        self.outbox.push(PanelCommand::ClearChat);
    }

    pub fn request_restart(&mut self, index: usize) -> bool {
        if index >= self.turns.len() {
            return false;
        }
        self.outbox.push(PanelCommand::RestartSession { number: index });
        true
    }

    /// Queues the first fenced code block of turn `index` for opening.
    pub fn request_open_code(&mut self, index: usize) -> bool {
        let Some(turn) = self.turns.get(index) else {
            return false;
        };
        let Some((lang, content)) = first_code_block(&turn.content) else {
            return false;
        };
        self.outbox.push(PanelCommand::OpenCode { content, lang });
        true
    }

    pub fn take_commands(&mut self) -> Vec<PanelCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn lock_scroll(&mut self) {
        self.scroll_locked = true;
    }

    pub fn unlock_scroll(&mut self) {
        self.scroll_locked = false;
    }

    pub fn follows_tail(&self) -> bool {
        !self.scroll_locked
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn turns(&self) -> &[RenderedTurn] {
        &self.turns
    }

    pub fn typing(&self) -> Option<&TypingPlaceholder> {
        self.typing.as_ref()
    }

    pub fn banner(&self) -> Banner {
        self.banner
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn render_state(&self) -> RenderState {
        RenderState {
            session_state: self.session_state,
            scroll_locked: self.scroll_locked,
            rendered_message_count: self.turns.len(),
            has_typing_placeholder: self.typing.is_some(),
        }
    }
}

pub fn first_code_block(content: &str) -> Option<(String, String)> {
    let caps = CODE_BLOCK.captures(content)?;
    let lang = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| "plaintext".to_string());
    Some((lang, caps[2].to_string()))
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "../tests/unit/panel_tests.rs"]
mod tests;
