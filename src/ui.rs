use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Clear, Padding, Paragraph};

use crate::app::App;
use crate::panel::{Banner, PanelState, RenderState, SessionState};
use crate::text_layout::{wrap_lines, wrap_word_with_positions};
use crate::theme::Theme;
use crate::wire::Role;

const MAX_INPUT_TEXT_LINES: u16 = 5;
const TEXT_PADDING: u16 = 1;
const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const STATUS_HELP_TEXT: &str =
    "Enter send | Esc stop | Ctrl+L clear | Up/Down PgUp/PgDn scroll | /quit";
const DEFAULT_BANNER_TEXT: &str = "Describe the test you want and press Enter.";
const WAITING_BANNER_TEXT: &str = "Waiting for the generation server...";

struct ChatLayout {
    title: Rect,
    messages: Rect,
    input: Rect,
    status: Rect,
    input_scroll: u16,
    cursor: (u16, u16),
}

fn chat_layout(screen: Rect, app: &App) -> ChatLayout {
    let [title, body, status] = Layout::vertical([
        Constraint::Length(TITLE_BAR_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .areas(screen);
    let input_text_width = body.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let input_text_lines = wrap_word_with_positions(app.chat_input(), input_text_width).line_count();
    let cursor = app.chat_cursor_line_col(input_text_width);
    let max_input_height = body.height.saturating_sub(1).max(1);
    let (input_height, input_scroll) = input_box_metrics(input_text_lines, cursor.0, max_input_height);
    let [messages, input] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(input_height)]).areas(body);
    ChatLayout {
        title,
        messages,
        input,
        status,
        input_scroll,
        cursor,
    }
}

pub fn chat_max_scroll(screen: Rect, app: &App) -> u16 {
    let layout = chat_layout(screen, app);
    if layout.messages.width < 1 || layout.messages.height < 1 {
        return 0;
    }
    let text_width = layout.messages.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let visible_lines = layout.messages.height.saturating_sub(TEXT_PADDING * 2);
    let total_lines = chat_display_lines(app.panel(), text_width, app.ticks).len() as u16;
    total_lines.saturating_sub(visible_lines)
}

pub fn chat_page_lines(screen: Rect, app: &App) -> u16 {
    chat_layout(screen, app)
        .messages
        .height
        .saturating_sub(TEXT_PADDING * 2)
        .max(1)
}

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let layout = chat_layout(frame.area(), app);
    render_title_bar(frame, layout.title, app, theme);
    render_messages(frame, &layout, app, theme);
    render_input(frame, &layout, app, theme);
    if !app.command_suggestions().is_empty() {
        render_command_index(frame, app, layout.messages, layout.input, theme);
    }

    frame.render_widget(
        Block::default().style(Style::default().bg(theme.status_bg)),
        layout.status,
    );
    let status = Paragraph::new(status_line_text(app.panel()))
        .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg))
        .block(
            Block::default()
                .style(Style::default().bg(theme.status_bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        );
    frame.render_widget(status, layout.status);
}

fn render_title_bar(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let render_state = app.panel().render_state();
    let state = render_state.session_state;
    let mut spans = vec![
        Span::styled("Test Generation", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(app.target_label().to_string(), Style::default().fg(theme.muted_fg)),
        Span::raw("  "),
        Span::styled(state_label(state).to_string(), state_style(state, theme)),
    ];
    if state == SessionState::Running || render_state.has_typing_placeholder {
        spans.push(Span::raw(" "));
        spans.push(Span::raw(working_dots(app.ticks)));
    }
    spans.push(Span::styled(
        title_counters(&render_state),
        Style::default().fg(theme.muted_fg),
    ));
    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.title_bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.title_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn render_messages(frame: &mut Frame, layout: &ChatLayout, app: &App, theme: &Theme) {
    let area = layout.messages;
    let text_width = area.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let lines = chat_display_lines(app.panel(), text_width, app.ticks);
    let scroll = app.effective_chat_scroll(chat_max_scroll(frame.area(), app));
    frame.render_widget(
        Paragraph::new(chat_text(&lines, theme))
            .scroll((scroll, 0))
            .style(Style::default().bg(theme.chat_bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.chat_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn render_input(frame: &mut Frame, layout: &ChatLayout, app: &App, theme: &Theme) {
    let area = layout.input;
    let text_width = area.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let wrapped = wrap_word_with_positions(app.chat_input(), text_width);
    frame.render_widget(
        Paragraph::new(wrapped.rendered())
            .block(
                Block::default()
                    .style(Style::default().bg(theme.input_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            )
            .style(Style::default().bg(theme.input_bg).fg(theme.text_fg))
            .scroll((layout.input_scroll, 0)),
        area,
    );

    let inner = area.inner(Margin {
        horizontal: TEXT_PADDING,
        vertical: TEXT_PADDING,
    });
    let (cursor_line, cursor_col) = layout.cursor;
    if inner.width > 0 && inner.height > 0 {
        let visible_line = cursor_line.saturating_sub(layout.input_scroll);
        if visible_line < inner.height {
            frame.set_cursor_position((
                inner
                    .x
                    .saturating_add(cursor_col.min(inner.width.saturating_sub(1))),
                inner.y.saturating_add(visible_line),
            ));
        }
    }
}

fn render_command_index(
    frame: &mut Frame,
    app: &App,
    messages_area: Rect,
    input_area: Rect,
    theme: &Theme,
) {
    let suggestions = app.command_suggestions();
    let height = (suggestions.len() as u16)
        .saturating_add(TEXT_PADDING * 2)
        .min(messages_area.height);
    if height == 0 {
        return;
    }
    let area = Rect::new(
        input_area.x,
        input_area.y.saturating_sub(height),
        input_area.width,
        height,
    );
    let lines = suggestions
        .into_iter()
        .map(|(command, description)| {
            Line::from(vec![
                Span::styled(format!("{command:<10}"), Style::default().fg(theme.text_fg)),
                Span::styled(description.to_string(), Style::default().fg(theme.muted_fg)),
            ])
        })
        .collect::<Vec<_>>();
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines)).block(
            Block::default()
                .style(Style::default().bg(theme.title_bg))
                .padding(Padding::horizontal(TEXT_PADDING)),
        ),
        area,
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Header(Role),
    Body,
    Typing(Role),
    Separator,
    Banner,
}

#[derive(Debug, Clone)]
struct ChatDisplayLine {
    kind: LineKind,
    text: String,
}

fn chat_display_lines(panel: &PanelState, width: u16, ticks: u64) -> Vec<ChatDisplayLine> {
    let width = width.max(1);
    let mut out = Vec::new();
    for (position, turn) in panel.turns().iter().enumerate() {
        if position > 0 {
            out.push(ChatDisplayLine {
                kind: LineKind::Separator,
                text: "─".repeat(width as usize),
            });
        }
        out.push(ChatDisplayLine {
            kind: LineKind::Header(turn.role.clone()),
            text: format!("[{}] {}", turn.index, turn.header),
        });
        for line in wrap_lines(&turn.content, width) {
            out.push(ChatDisplayLine {
                kind: LineKind::Body,
                text: line,
            });
        }
    }

    if let Some(typing) = panel.typing() {
        if !out.is_empty() {
            out.push(ChatDisplayLine {
                kind: LineKind::Separator,
                text: "─".repeat(width as usize),
            });
        }
        let text = format!("{} {} {}", typing.role, typing.content, working_dots(ticks));
        for line in wrap_lines(&text, width) {
            out.push(ChatDisplayLine {
                kind: LineKind::Typing(typing.role.clone()),
                text: line,
            });
        }
    }

    if out.is_empty() {
        let banner = match panel.banner() {
            Banner::Hidden => None,
            Banner::Default => Some(DEFAULT_BANNER_TEXT),
            Banner::Waiting => Some(WAITING_BANNER_TEXT),
        };
        if let Some(banner) = banner {
            for line in wrap_lines(banner, width) {
                out.push(ChatDisplayLine {
                    kind: LineKind::Banner,
                    text: line,
                });
            }
        }
    }
    out
}

fn chat_text(lines: &[ChatDisplayLine], theme: &Theme) -> Text<'static> {
    let out_lines = lines
        .iter()
        .map(|line| {
            let style = match &line.kind {
                LineKind::Header(role) => Style::default()
                    .fg(theme.role_fg(role))
                    .add_modifier(Modifier::BOLD),
                LineKind::Body => Style::default().fg(theme.text_fg),
                LineKind::Typing(role) => Style::default()
                    .fg(theme.role_fg(role))
                    .add_modifier(Modifier::DIM | Modifier::ITALIC),
                LineKind::Separator => Style::default().fg(separator_color(theme)),
                LineKind::Banner => Style::default().fg(theme.muted_fg),
            };
            Line::from(Span::styled(line.text.clone(), style))
        })
        .collect::<Vec<_>>();
    Text::from(out_lines)
}

fn separator_color(theme: &Theme) -> Color {
    match theme.chat_bg {
        Color::Rgb(r, g, b) => Color::Rgb(
            r.saturating_add(16),
            g.saturating_add(16),
            b.saturating_add(16),
        ),
        _ => theme.muted_fg,
    }
}

fn status_line_text(panel: &PanelState) -> String {
    match panel.notices().last() {
        Some(notice) => format!("{notice} | {STATUS_HELP_TEXT}"),
        None => STATUS_HELP_TEXT.to_string(),
    }
}

fn title_counters(render_state: &RenderState) -> String {
    let mut text = match render_state.rendered_message_count {
        1 => "  1 message".to_string(),
        count => format!("  {count} messages"),
    };
    if render_state.scroll_locked {
        text.push_str("  [scroll locked]");
    }
    text
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::Running => "running",
        SessionState::Stopping => "stopping",
        SessionState::Stopped => "stopped",
    }
}

fn state_style(state: SessionState, theme: &Theme) -> Style {
    match state {
        SessionState::Running => Style::default().fg(theme.assistant_fg),
        SessionState::Stopping | SessionState::Stopped => Style::default().fg(Color::Rgb(220, 90, 90)),
        SessionState::Idle => Style::default().fg(theme.muted_fg),
    }
}

fn working_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 2) as usize) % FRAMES.len()]
}

fn input_box_metrics(input_text_lines: u16, cursor_line: u16, max_input_height: u16) -> (u16, u16) {
    let capped_text_lines = input_text_lines.clamp(1, MAX_INPUT_TEXT_LINES);
    let desired_height = capped_text_lines.saturating_add(TEXT_PADDING * 2);
    let input_height = desired_height.clamp(1, max_input_height.max(1));
    let visible_text_lines = input_height.saturating_sub(TEXT_PADDING * 2).max(1);
    let max_scroll = input_text_lines.saturating_sub(visible_text_lines);
    let middle_line = visible_text_lines / 2;
    let input_scroll = cursor_line.saturating_sub(middle_line).min(max_scroll);
    (input_height, input_scroll)
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
