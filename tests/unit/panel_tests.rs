use super::*;

fn turn(role: Role, content: &str, index: Option<usize>) -> PanelEvent {
    PanelEvent::Turn {
        role,
        content: content.to_string(),
        sender_type: None,
        index,
    }
}

fn state(state: ReportedState) -> PanelEvent {
    PanelEvent::SessionState {
        state,
        message: None,
    }
}

fn typing(role: Role) -> PanelEvent {
    PanelEvent::Typing {
        role,
        content: "Waiting...".to_string(),
    }
}

fn running_panel() -> PanelState {
    let mut panel = PanelState::default();
    panel.apply(state(ReportedState::Running));
    panel
}

#[test]
fn starts_idle_with_the_default_banner() {
    let panel = PanelState::default();
    assert_eq!(panel.session_state(), SessionState::Idle);
    assert_eq!(panel.banner(), Banner::Default);
    assert_eq!(
        panel.render_state(),
        RenderState {
            session_state: SessionState::Idle,
            scroll_locked: false,
            rendered_message_count: 0,
            has_typing_placeholder: false,
        }
    );
}

#[test]
fn running_without_turns_shows_the_waiting_banner() {
    let panel = running_panel();
    assert_eq!(panel.session_state(), SessionState::Running);
    assert_eq!(panel.banner(), Banner::Waiting);
}

#[test]
fn typing_is_replaced_by_the_next_turn() {
    let mut panel = running_panel();
    panel.apply(typing(Role::Assistant));
    assert!(panel.typing().is_some());
    assert_eq!(panel.banner(), Banner::Hidden);

    panel.apply(turn(Role::Assistant, "answer", Some(0)));

    assert!(panel.typing().is_none());
    assert_eq!(panel.turns().len(), 1);
    assert_eq!(panel.turns()[0].header, "Assistant");
}

#[test]
fn newer_typing_replaces_the_old_one() {
    let mut panel = running_panel();
    panel.apply(typing(Role::System));
    panel.apply(typing(Role::User));
    assert_eq!(panel.typing().map(|typing| &typing.role), Some(&Role::User));
}

#[test]
fn typing_outside_a_running_session_is_dropped() {
    let mut panel = PanelState::default();
    panel.apply(typing(Role::User));
    assert!(panel.typing().is_none());
    assert_eq!(panel.banner(), Banner::Default);
}

#[test]
fn leaving_running_removes_the_placeholder() {
    let mut panel = running_panel();
    panel.apply(turn(Role::User, "go", Some(0)));
    panel.apply(typing(Role::Assistant));
    panel.apply(state(ReportedState::Idle));
    assert!(panel.typing().is_none());
    assert_eq!(panel.session_state(), SessionState::Idle);
    assert_eq!(panel.turns().len(), 1);
}

#[test]
fn user_stop_moves_to_stopping_and_queues_the_command() {
    let mut panel = running_panel();
    assert!(panel.request_stop());
    assert_eq!(panel.session_state(), SessionState::Stopping);
    assert_eq!(panel.notices().last().map(String::as_str), Some("Stopping generation..."));
    assert_eq!(panel.take_commands(), vec![PanelCommand::StopRun]);

    panel.apply(PanelEvent::SessionState {
        state: ReportedState::Stopped,
        message: Some("Generation was stopped manually.".to_string()),
    });
    assert_eq!(panel.session_state(), SessionState::Stopped);
    assert_eq!(
        panel.notices().last().map(String::as_str),
        Some("Generation was stopped manually.")
    );
}

#[test]
fn stop_is_ignored_unless_running() {
    let mut panel = PanelState::default();
    assert!(!panel.request_stop());
    assert!(panel.take_commands().is_empty());
}

#[test]
fn stopping_keeps_the_waiting_banner_until_the_host_answers() {
    let mut panel = running_panel();
    panel.request_stop();
    panel.apply(PanelEvent::Clear { to_index: 0 });
    assert_eq!(panel.banner(), Banner::Waiting);
    panel.apply(state(ReportedState::Idle));
    assert_eq!(panel.banner(), Banner::Default);
}

#[test]
fn clear_truncates_and_resets_the_banner() {
    let mut panel = running_panel();
    for (index, content) in ["a", "b", "c"].into_iter().enumerate() {
        panel.apply(turn(Role::User, content, Some(index)));
    }
    panel.apply(typing(Role::Assistant));

    panel.apply(PanelEvent::Clear { to_index: 1 });
    assert_eq!(panel.turns().len(), 1);
    assert!(panel.typing().is_none());
    assert_eq!(panel.banner(), Banner::Hidden);

    panel.apply(PanelEvent::Clear { to_index: 0 });
    assert!(panel.turns().is_empty());
    assert_eq!(panel.banner(), Banner::Waiting);
}

#[test]
fn turn_with_a_lower_index_replaces_from_there() {
    let mut panel = running_panel();
    panel.apply(turn(Role::User, "A", Some(0)));
    panel.apply(turn(Role::User, "B", Some(1)));
    panel.apply(turn(Role::User, "C", Some(2)));

    panel.apply(turn(Role::User, "X", Some(1)));
    panel.apply(turn(Role::User, "C", Some(2)));

    let contents = panel
        .turns()
        .iter()
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>();
    assert_eq!(contents, vec!["A", "X", "C"]);
    assert_eq!(panel.turns()[2].index, 2);
}

#[test]
fn turn_without_an_index_appends() {
    let mut panel = PanelState::default();
    panel.apply(turn(Role::User, "a", None));
    panel.apply(turn(Role::User, "b", None));
    assert_eq!(panel.turns().len(), 2);
}

#[test]
fn sender_type_becomes_the_header() {
    let mut panel = PanelState::default();
    panel.apply(PanelEvent::Turn {
        role: Role::Assistant,
        content: "x".to_string(),
        sender_type: Some("assistant (gpt-4o)".to_string()),
        index: Some(0),
    });
    assert_eq!(panel.turns()[0].header, "Assistant (gpt-4o)");
}

#[test]
fn errors_and_notices_are_kept_bounded() {
    let mut panel = PanelState::default();
    panel.apply(PanelEvent::Error {
        message: "boom".to_string(),
    });
    assert_eq!(panel.notices(), ["Error: boom".to_string()]);
    for index in 0..80 {
        panel.apply(PanelEvent::Notice {
            message: format!("n{index}"),
        });
    }
    assert_eq!(panel.notices().len(), 50);
    assert_eq!(panel.notices().last().map(String::as_str), Some("n79"));
}

#[test]
fn open_code_queues_the_first_fenced_block() {
    let mut panel = PanelState::default();
    panel.apply(turn(
        Role::Assistant,
        "Here:\n```java\nclass T {}\n```\nand\n```\nother\n```",
        Some(0),
    ));
    assert!(panel.request_open_code(0));
    assert_eq!(
        panel.take_commands(),
        vec![PanelCommand::OpenCode {
            content: "class T {}\n".to_string(),
            lang: "java".to_string(),
        }]
    );
    assert!(!panel.request_open_code(3));
}

#[test]
fn code_block_without_a_language_is_plaintext() {
    assert_eq!(
        first_code_block("```\nx\n```"),
        Some(("plaintext".to_string(), "x\n".to_string()))
    );
    assert_eq!(first_code_block("no code"), None);
}

#[test]
fn restart_and_clear_are_forwarded() {
    let mut panel = PanelState::default();
    panel.apply(turn(Role::User, "a", Some(0)));
    assert!(panel.request_restart(0));
    assert!(!panel.request_restart(1));
    panel.request_clear();
    assert_eq!(
        panel.take_commands(),
        vec![
            PanelCommand::RestartSession { number: 0 },
            PanelCommand::ClearChat
        ]
    );
}

#[test]
fn scroll_lock_toggles_tail_following() {
    let mut panel = PanelState::default();
    assert!(panel.follows_tail());
    panel.lock_scroll();
    assert!(!panel.follows_tail());
    assert!(panel.render_state().scroll_locked);
    panel.unlock_scroll();
    assert!(panel.follows_tail());
}

#[test]
fn events_serialize_to_the_panel_json_shapes() {
    assert_eq!(
        turn(Role::User, "hi", Some(2)).to_json(),
        json!({"role": "user", "content": "hi", "index": 2})
    );
    assert_eq!(
        typing(Role::Assistant).to_json(),
        json!({"role": "assistant-wait", "content": "Waiting..."})
    );
    assert_eq!(
        PanelEvent::SessionState {
            state: ReportedState::Stopped,
            message: Some("m".to_string())
        }
        .to_json(),
        json!({"cmd": "session-state", "state": "stopped", "message": "m"})
    );
    assert_eq!(
        PanelEvent::Clear { to_index: 0 }.to_json(),
        json!({"cmd": "clear", "toIndex": 0})
    );
}

#[test]
fn commands_use_kebab_case_cmd_tags() {
    assert_eq!(
        serde_json::to_value(PanelCommand::StopRun).expect("json"),
        json!({"cmd": "stop-run"})
    );
    assert_eq!(
        serde_json::to_value(PanelCommand::RestartSession { number: 4 }).expect("json"),
        json!({"cmd": "restart-session", "number": 4})
    );
    let parsed: PanelCommand =
        serde_json::from_value(json!({"cmd": "open-code", "content": "c", "lang": "py"}))
            .expect("parse");
    assert_eq!(
        parsed,
        PanelCommand::OpenCode {
            content: "c".to_string(),
            lang: "py".to_string()
        }
    );
}

#[test]
fn a_second_generation_keeps_the_first_transcript() {
    let mut panel = running_panel();
    panel.apply(turn(Role::User, "first prompt", Some(0)));
    panel.apply(turn(Role::Assistant, "first answer", Some(1)));
    panel.apply(state(ReportedState::Idle));

    panel.apply(state(ReportedState::Running));
    panel.apply(turn(Role::User, "second prompt", Some(0)));
    panel.apply(turn(Role::Assistant, "draft", Some(1)));
    panel.apply(turn(Role::Assistant, "final", Some(1)));

    let contents = panel
        .turns()
        .iter()
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        contents,
        vec!["first prompt", "first answer", "second prompt", "final"]
    );
    assert_eq!(panel.turns()[3].index, 3);
}

#[test]
fn clearing_below_the_generation_start_rebases_it() {
    let mut panel = running_panel();
    panel.apply(turn(Role::User, "a", Some(0)));
    panel.apply(state(ReportedState::Idle));
    panel.apply(state(ReportedState::Running));
    panel.apply(turn(Role::User, "b", Some(0)));

    panel.apply(PanelEvent::Clear { to_index: 0 });
    panel.apply(turn(Role::User, "c", Some(0)));

    assert_eq!(panel.turns().len(), 1);
    assert_eq!(panel.turns()[0].content, "c");
}
