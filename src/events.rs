use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    StopGeneration,
    ClearChat,
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    ScrollChatUp,
    ScrollChatDown,
    PageChatUp,
    PageChatDown,
    InputChar(char),
    Backspace,
    Submit,
    MouseScrollUp,
    MouseScrollDown,
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) {
        match key_event.code {
            KeyCode::Char('c') => return AppEvent::Quit,
            KeyCode::Char('l') => return AppEvent::ClearChat,
            KeyCode::Char('u') => return AppEvent::PageChatUp,
            KeyCode::Char('d') => return AppEvent::PageChatDown,
            _ => {}
        }
    }

    match key_event.code {
        KeyCode::Esc => AppEvent::StopGeneration,
        KeyCode::Up => AppEvent::ScrollChatUp,
        KeyCode::Down => AppEvent::ScrollChatDown,
        KeyCode::PageUp => AppEvent::PageChatUp,
        KeyCode::PageDown => AppEvent::PageChatDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Home => AppEvent::CursorHome,
        KeyCode::End => AppEvent::CursorEnd,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::MouseScrollUp,
        MouseEventKind::ScrollDown => AppEvent::MouseScrollDown,
        _ => AppEvent::Tick,
    }
}

pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(Duration::from_millis(16))? {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                return Ok(map_key_event(key_event));
            }
            Event::Mouse(mouse_event) => return Ok(map_mouse_event_kind(mouse_event.kind)),
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
