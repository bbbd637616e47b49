use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tokio::runtime::Runtime;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod default_config;
mod error;
mod events;
mod host;
mod panel;
mod reconcile;
mod session;
mod text_layout;
mod theme;
mod transport;
mod ui;
mod wire;

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
mod test_support;

use app::{App, Submission};
use config::{AppConfig, config_dir, log_file_path};
use events::AppEvent;
use host::Host;
use panel::PanelEvent;
use session::{SessionClient, SessionOutcome};
use theme::Theme;
use transport::Transport;
use wire::QueryParams;

const MAX_PANEL_EVENTS_PER_LOOP: usize = 128;
const THEME_FILE_NAME: &str = "theme.toml";

#[derive(Debug, Parser)]
#[command(
    name = "testgen-chat",
    version,
    about = "Chat client for a local unit-test generation server"
)]
struct Cli {
    /// Config file to use instead of ~/.testgen/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Interactive chat panel (default).
    Panel(TargetArgs),
    /// Run one generation and print every panel event as a JSON line.
    Query(QueryArgs),
    /// Change the JUnit version the server generates for.
    JunitVersion { version: String },
    /// Ask the server to stop a session.
    Stop { session_id: String },
}

#[derive(Debug, Clone, Default, Args)]
struct TargetArgs {
    #[arg(long, default_value = "")]
    focal_method: String,
    /// Focal file, relative to the project.
    #[arg(long, default_value = "")]
    focal_file: String,
    /// Project root. Defaults to the current directory.
    #[arg(long)]
    project: Option<PathBuf>,
    /// Absolute focal file path. Defaults to <project>/<focal-file>.
    #[arg(long)]
    focal_file_path: Option<PathBuf>,
}

impl TargetArgs {
    fn query_params(&self, test_desc: String) -> io::Result<QueryParams> {
        let project = match &self.project {
            Some(project) => project.clone(),
            None => std::env::current_dir()?,
        };
        let focal_file_path = self
            .focal_file_path
            .clone()
            .unwrap_or_else(|| project.join(&self.focal_file));
        Ok(QueryParams {
            target_focal_method: self.focal_method.clone(),
            target_focal_file: self.focal_file.clone(),
            test_desc,
            project_path: project.display().to_string(),
            focal_file_path: focal_file_path.display().to_string(),
        })
    }

    fn label(&self) -> String {
        match (self.focal_file.is_empty(), self.focal_method.is_empty()) {
            (true, true) => "no focal method".to_string(),
            (false, true) => self.focal_file.clone(),
            (true, false) => self.focal_method.clone(),
            (false, false) => format!("{}#{}", self.focal_file, self.focal_method),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct QueryArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, conflicts_with = "description_file")]
    description: Option<String>,
    #[arg(long)]
    description_file: Option<PathBuf>,
}

impl QueryArgs {
    fn description(&self) -> io::Result<String> {
        match (&self.description, &self.description_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => std::fs::read_to_string(path),
            (None, None) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "query needs --description or --description-file",
            )),
        }
    }
}

enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

fn init_tracing(verbose: bool, target: LogTarget<'_>) -> io::Result<()> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact();
    match target {
        LogTarget::Stderr => builder.with_writer(io::stderr).init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            // Anything on the terminal would tear the panel.
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config =
        AppConfig::load(cli.config.as_deref())?.with_overrides(cli.host.clone(), cli.port);
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Command::Panel(TargetArgs::default()));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match command {
        Command::Panel(target) => {
            let log_path = log_file_path()?;
            init_tracing(cli.verbose, LogTarget::File(&log_path))?;
            run_panel(&runtime, &config, &target)
        }
        Command::Query(args) => {
            init_tracing(cli.verbose, LogTarget::Stderr)?;
            run_query(&runtime, &config, &args)
        }
        Command::JunitVersion { version } => {
            init_tracing(cli.verbose, LogTarget::Stderr)?;
            let client = connect(&config)?;
            runtime
                .block_on(client.change_junit_version(&version))
                .map_err(io::Error::other)?;
            println!("JUnit version set to {version}");
            Ok(())
        }
        Command::Stop { session_id } => {
            init_tracing(cli.verbose, LogTarget::Stderr)?;
            let client = connect(&config)?;
            runtime
                .block_on(client.handle().send_stop_signal(&session_id))
                .map_err(io::Error::other)?;
            println!("Stop signal sent for session {session_id}");
            Ok(())
        }
    }
}

fn connect(config: &AppConfig) -> io::Result<SessionClient> {
    let transport =
        Transport::new(&config.server.host, config.server.port).map_err(io::Error::other)?;
    info!(server = transport.base_url(), "using generation server");
    Ok(SessionClient::new(transport))
}

fn run_query(runtime: &Runtime, config: &AppConfig, args: &QueryArgs) -> io::Result<()> {
    let params = args.target.query_params(args.description()?)?;
    let (event_tx, event_rx) = mpsc::channel();
    let host = Host::new(connect(config)?, event_tx, config.panel.scratch_dir.clone());
    let printer = thread::spawn(move || print_events(event_rx));

    let interrupt = {
        let host = host.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted; stopping the active session");
                host.stop_active_session().await;
            }
        })
    };
    let result = runtime.block_on(host.generate_test(params));
    interrupt.abort();
    // Joining the aborted task drops its host clone, which closes the channel.
    let _ = runtime.block_on(interrupt);
    drop(host);
    if printer.join().is_err() {
        warn!("event printer panicked");
    }

    match result.map_err(io::Error::other)? {
        SessionOutcome::Failed(err) => Err(io::Error::other(err)),
        outcome => {
            info!(outcome = outcome.label(), "query done");
            Ok(())
        }
    }
}

fn print_events(events: Receiver<PanelEvent>) {
    let stdout = io::stdout();
    // Keeps draining after a closed stdout so the channel never backs up.
    for event in events {
        let mut out = stdout.lock();
        let _ = writeln!(out, "{}", event.to_json()).and_then(|()| out.flush());
    }
}

fn run_panel(runtime: &Runtime, config: &AppConfig, target: &TargetArgs) -> io::Result<()> {
    let (event_tx, event_rx) = mpsc::channel();
    let host = Host::new(connect(config)?, event_tx, config.panel.scratch_dir.clone());
    let theme = Theme::load_or_default(config_dir()?.join(THEME_FILE_NAME));
    let app = App::new(target.label(), config.panel.scroll_idle);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, app, &theme, runtime, &host, target, &event_rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    theme: &Theme,
    runtime: &Runtime,
    host: &Host,
    target: &TargetArgs,
    panel_events: &Receiver<PanelEvent>,
) -> io::Result<()> {
    while app.running {
        for event in drain_events_limited(panel_events, MAX_PANEL_EVENTS_PER_LOOP) {
            app.apply_panel_event(event);
        }
        for command in app.panel_mut().take_commands() {
            let host = host.clone();
            runtime.spawn(async move { host.handle_panel_command(command).await });
        }

        terminal.draw(|frame| ui::render(frame, &app, theme))?;
        let size = terminal.size()?;
        let screen = Rect::new(0, 0, size.width, size.height);
        let max_scroll = ui::chat_max_scroll(screen, &app);
        app.sync_chat_scroll(max_scroll);

        let now = Instant::now();
        match events::next_event()? {
            AppEvent::Tick => app.on_tick(now),
            AppEvent::Quit => quit(&mut app, runtime, host),
            AppEvent::StopGeneration => {
                app.request_stop();
            }
            AppEvent::ClearChat => app.panel_mut().request_clear(),
            AppEvent::CursorLeft => app.move_cursor_left(),
            AppEvent::CursorRight => app.move_cursor_right(),
            AppEvent::CursorHome => app.move_cursor_home(),
            AppEvent::CursorEnd => app.move_cursor_end(),
            AppEvent::ScrollChatUp | AppEvent::MouseScrollUp => app.scroll_chat_up(1, now),
            AppEvent::ScrollChatDown | AppEvent::MouseScrollDown => {
                app.scroll_chat_down(1, max_scroll, now)
            }
            AppEvent::PageChatUp => app.scroll_chat_up(ui::chat_page_lines(screen, &app), now),
            AppEvent::PageChatDown => {
                let page = ui::chat_page_lines(screen, &app);
                app.scroll_chat_down(page, max_scroll, now);
            }
            AppEvent::InputChar(c) => app.input_char(c),
            AppEvent::Backspace => app.backspace_input(),
            AppEvent::Submit => match app.submit_input() {
                Some(Submission::Generate(description)) => {
                    match target.query_params(description) {
                        Ok(params) => {
                            let host = host.clone();
                            runtime.spawn(async move {
                                // Failures already reached the panel as events.
                                if let Err(err) = host.generate_test(params).await {
                                    debug!(error = %err, "generation not started");
                                }
                            });
                        }
                        Err(err) => app
                            .panel_mut()
                            .push_notice(format!("Cannot build the query: {err}")),
                    }
                }
                Some(Submission::JunitVersion(version)) => {
                    let host = host.clone();
                    runtime.spawn(async move {
                        if let Err(err) = host.change_junit_version(&version).await {
                            debug!(error = %err, "junit version unchanged");
                        }
                    });
                }
                Some(Submission::Quit) => quit(&mut app, runtime, host),
                None => {}
            },
        }
    }
    Ok(())
}

fn quit(app: &mut App, runtime: &Runtime, host: &Host) {
    if host.client().is_active() {
        runtime.block_on(host.stop_active_session());
    }
    app.quit();
}

fn drain_events_limited(events: &Receiver<PanelEvent>, limit: usize) -> Vec<PanelEvent> {
    let mut drained = Vec::new();
    while drained.len() < limit {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(_) => break,
        }
    }
    drained
}
