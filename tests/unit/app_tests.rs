use super::*;
use crate::panel::{PanelCommand, ReportedState};
use crate::wire::Role;

fn app() -> App {
    App::new("Calc.java#add", Duration::from_secs(3))
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        app.input_char(c);
    }
}

fn set_running(app: &mut App) {
    app.apply_panel_event(PanelEvent::SessionState {
        state: ReportedState::Running,
        message: None,
    });
}

#[test]
fn plain_text_submits_a_generation() {
    let mut app = app();
    type_text(&mut app, "  cover the overflow case ");
    assert_eq!(
        app.submit_input(),
        Some(Submission::Generate("cover the overflow case".to_string()))
    );
    assert_eq!(app.chat_input(), "");
}

#[test]
fn blank_input_submits_nothing() {
    let mut app = app();
    type_text(&mut app, "   ");
    assert_eq!(app.submit_input(), None);
}

#[test]
fn description_is_refused_while_running() {
    let mut app = app();
    set_running(&mut app);
    type_text(&mut app, "another");
    assert_eq!(app.submit_input(), None);
    assert!(
        app.panel()
            .notices()
            .last()
            .is_some_and(|notice| notice.contains("/stop"))
    );
}

#[test]
fn slash_stop_queues_a_stop_while_running() {
    let mut app = app();
    set_running(&mut app);
    type_text(&mut app, "/stop");
    assert_eq!(app.submit_input(), None);
    assert_eq!(app.panel_mut().take_commands(), vec![PanelCommand::StopRun]);
}

#[test]
fn slash_commands_route_to_panel_or_caller() {
    let mut app = app();
    type_text(&mut app, "/junit 5");
    assert_eq!(
        app.submit_input(),
        Some(Submission::JunitVersion("5".to_string()))
    );

    type_text(&mut app, "/quit");
    assert_eq!(app.submit_input(), Some(Submission::Quit));

    type_text(&mut app, "/clear");
    assert_eq!(app.submit_input(), None);
    assert_eq!(app.panel_mut().take_commands(), vec![PanelCommand::ClearChat]);
}

#[test]
fn restart_and_open_need_an_existing_message() {
    let mut app = app();
    app.apply_panel_event(PanelEvent::Turn {
        role: Role::Assistant,
        content: "```kotlin\nfun t() {}\n```".to_string(),
        sender_type: None,
        index: Some(0),
    });

    type_text(&mut app, "/open 0");
    app.submit_input();
    type_text(&mut app, "/restart 0");
    app.submit_input();
    type_text(&mut app, "/restart 7");
    app.submit_input();

    assert_eq!(
        app.panel_mut().take_commands(),
        vec![
            PanelCommand::OpenCode {
                content: "fun t() {}\n".to_string(),
                lang: "kotlin".to_string(),
            },
            PanelCommand::RestartSession { number: 0 },
        ]
    );
    assert!(
        app.panel()
            .notices()
            .last()
            .is_some_and(|notice| notice.contains("'7'"))
    );
}

#[test]
fn unknown_commands_leave_a_notice() {
    let mut app = app();
    type_text(&mut app, "/dance");
    assert_eq!(app.submit_input(), None);
    assert_eq!(
        app.panel().notices().last().map(String::as_str),
        Some("Unknown command /dance")
    );
}

#[test]
fn cursor_editing_handles_multibyte_chars() {
    let mut app = app();
    type_text(&mut app, "héllo");
    app.move_cursor_left();
    app.move_cursor_left();
    app.backspace_input();
    assert_eq!(app.chat_input(), "hélo");
    app.move_cursor_home();
    app.input_char('>');
    app.move_cursor_end();
    app.input_char('!');
    assert_eq!(app.chat_input(), ">hélo!");
}

#[test]
fn manual_scroll_locks_until_idle_timeout() {
    let mut app = app();
    let start = Instant::now();
    app.sync_chat_scroll(10);
    assert_eq!(app.effective_chat_scroll(10), 10);

    app.scroll_chat_up(3, start);
    assert!(!app.panel().follows_tail());
    assert_eq!(app.effective_chat_scroll(20), 7);

    app.on_tick(start + Duration::from_secs(1));
    assert!(!app.panel().follows_tail());
    app.on_tick(start + Duration::from_secs(3));
    assert!(app.panel().follows_tail());
    assert_eq!(app.effective_chat_scroll(20), 20);
}

#[test]
fn scroll_down_is_capped() {
    let mut app = app();
    let now = Instant::now();
    app.scroll_chat_down(50, 4, now);
    assert_eq!(app.effective_chat_scroll(4), 4);
}

#[test]
fn command_suggestions_filter_by_prefix() {
    let mut app = app();
    type_text(&mut app, "/re");
    assert_eq!(
        app.command_suggestions()
            .into_iter()
            .map(|(command, _)| command)
            .collect::<Vec<_>>(),
        vec!["/restart"]
    );
    type_text(&mut app, "start 1");
    assert!(app.command_suggestions().is_empty());
}
