//! Turns the cumulative transcript the server resends on every batch into
//! the minimal sequence of panel updates.

use std::sync::LazyLock;

use regex::Regex;

use crate::panel::PanelEvent;
use crate::wire::{Message, Role};

/// Content prefix the server uses on the final message of a generation.
pub const FINISH_SENTINEL: &str = "FINISH GENERATION";
pub const WAITING_TEXT: &str = "Waiting...";

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("fenced block pattern"));
static LINE_NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[0-9]+:").expect("line number pattern"));

/// Messages of `current` from the first slot where it diverges from
/// `previous`, paired with their absolute index.
pub fn reconcile<'a>(previous: &[Message], current: &'a [Message]) -> Vec<(&'a Message, usize)> {
    let shared = previous
        .iter()
        .zip(current)
        .take_while(|(before, now)| before.same_turn(now))
        .count();
    current
        .iter()
        .enumerate()
        .skip(shared)
        .map(|(index, message)| (message, index))
        .collect()
}

/// Role expected to speak next, or `None` once generation has finished.
pub fn waiting_role(last: &Message) -> Option<Role> {
    if last.content.trim().starts_with(FINISH_SENTINEL) {
        return None;
    }
    Some(match last.role {
        Role::System => Role::User,
        Role::User => Role::Assistant,
        _ => Role::User,
    })
}

/// Drops the `NNN:` prefixes the server puts on each line inside fenced
/// code blocks.
pub fn strip_code_line_numbers(content: &str) -> String {
    FENCED_BLOCK
        .replace_all(content, |caps: &regex::Captures<'_>| {
            LINE_NUMBER_PREFIX.replace_all(&caps[0], "").into_owned()
        })
        .into_owned()
}

pub fn sender_label(message: &Message) -> Option<String> {
    match (&message.role, message.model.as_deref()) {
        (Role::Assistant, Some(model)) if !model.trim().is_empty() => {
            Some(format!("assistant ({model})"))
        }
        _ => None,
    }
}

pub fn turn_event(message: &Message, index: usize) -> PanelEvent {
    PanelEvent::Turn {
        role: message.role.clone(),
        content: strip_code_line_numbers(&message.content),
        sender_type: sender_label(message),
        index: Some(index),
    }
}

/// Last transcript pushed to the panel for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    rendered: Vec<Message>,
}

impl Transcript {
    #[cfg(test)]
    pub fn rendered(&self) -> &[Message] {
        &self.rendered
    }

    pub fn apply(&mut self, current: Vec<Message>) -> Vec<PanelEvent> {
        let mut events = reconcile(&self.rendered, &current)
            .into_iter()
            .map(|(message, index)| turn_event(message, index))
            .collect::<Vec<_>>();
        if let Some(role) = current.last().and_then(waiting_role) {
            events.push(PanelEvent::Typing {
                role,
                content: WAITING_TEXT.to_string(),
            });
        }
        self.rendered = current;
        events
    }
}

#[cfg(test)]
#[path = "../tests/unit/reconcile_tests.rs"]
mod tests;
