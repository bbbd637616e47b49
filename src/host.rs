//! Glue between a [`SessionClient`] and whatever renders [`PanelEvent`]s.
//!
//! The host owns the reporting rules: what the panel sees before a query is
//! sent, how errors are phrased, and which session state follows each way a
//! generation can end.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::write_scratch_file;
use crate::error::ClientError;
use crate::panel::{PanelCommand, PanelEvent, ReportedState};
use crate::reconcile::Transcript;
use crate::session::{SessionClient, SessionObserver, SessionOutcome};
use crate::wire::{Message, QueryParams, Role};

pub const PREPARING_TEXT: &str = "Server is preparing...";
pub const STOPPED_TEXT: &str = "Generation was stopped manually.";

/// Forwards one query's observer callbacks to the panel channel.
struct PanelBridge {
    events: Sender<PanelEvent>,
    transcript: Mutex<Transcript>,
}

impl PanelBridge {
    fn new(events: Sender<PanelEvent>) -> Self {
        Self {
            events,
            transcript: Mutex::new(Transcript::default()),
        }
    }

    fn post(&self, event: PanelEvent) {
        if self.events.send(event).is_err() {
            debug!("panel receiver closed; dropping event");
        }
    }
}

impl SessionObserver for PanelBridge {
    fn on_messages(&self, messages: Vec<Message>) {
        let events = self
            .transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(messages);
        for event in events {
            self.post(event);
        }
    }

    fn on_error(&self, error: &ClientError) {
        self.post(PanelEvent::Error {
            message: format!("Query error when connecting to the server: {error}"),
        });
    }

    fn on_no_reference(&self, junit_version: &str) {
        self.post(PanelEvent::Notice {
            message: no_reference_text(junit_version),
        });
    }
}

pub fn no_reference_text(junit_version: &str) -> String {
    format!(
        "No referable test case was found. Generating without a reference using JUnit {junit_version}. \
         Use /junit <version> to switch versions."
    )
}

#[derive(Clone)]
pub struct Host {
    client: SessionClient,
    events: Sender<PanelEvent>,
    scratch_dir: PathBuf,
}

impl Host {
    pub fn new(client: SessionClient, events: Sender<PanelEvent>, scratch_dir: PathBuf) -> Self {
        Self {
            client,
            events,
            scratch_dir,
        }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    fn post(&self, event: PanelEvent) {
        if self.events.send(event).is_err() {
            debug!("panel receiver closed; dropping event");
        }
    }

    /// Runs one generation and reports it to the panel. A cancelled run is
    /// left for [`Host::stop_active_session`] to report. The query slot is
    /// claimed before anything is posted, so a refused generation never
    /// touches the state the running one reported.
    pub async fn generate_test(&self, params: QueryParams) -> Result<SessionOutcome, ClientError> {
        let ticket = match self.client.reserve() {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!(error = %err, "generation refused");
                self.post(PanelEvent::Error {
                    message: "A generation is already running. Stop it before starting another."
                        .to_string(),
                });
                return Err(err);
            }
        };
        self.post(PanelEvent::SessionState {
            state: ReportedState::Running,
            message: None,
        });
        self.post(PanelEvent::Typing {
            role: Role::System,
            content: PREPARING_TEXT.to_string(),
        });

        let bridge = Arc::new(PanelBridge::new(self.events.clone()));
        let outcome = self.client.run_reserved(ticket, &params, bridge).await;
        if !matches!(outcome, SessionOutcome::Cancelled) {
            debug!(outcome = outcome.label(), "generation ended");
            self.report_idle();
        }
        Ok(outcome)
    }

    pub async fn stop_active_session(&self) {
        if !self.client.is_active() {
            debug!("stop requested while idle");
            self.report_idle();
            return;
        }
        self.client.stop_active_session().await;
        info!("generation stopped by user");
        self.post(PanelEvent::SessionState {
            state: ReportedState::Stopped,
            message: Some(STOPPED_TEXT.to_string()),
        });
    }

    pub async fn change_junit_version(&self, version: &str) -> Result<(), ClientError> {
        match self.client.change_junit_version(version).await {
            Ok(()) => {
                self.post(PanelEvent::Notice {
                    message: format!("JUnit version set to {version}."),
                });
                Ok(())
            }
            Err(err) => {
                self.post(PanelEvent::Error {
                    message: format!("Failed to change the JUnit version: {err}"),
                });
                Err(err)
            }
        }
    }

    pub async fn handle_panel_command(&self, command: PanelCommand) {
        debug!(?command, "panel command");
        match command {
            PanelCommand::StopRun => self.stop_active_session().await,
            PanelCommand::ClearChat => self.post(PanelEvent::Clear { to_index: 0 }),
            PanelCommand::RestartSession { number } => {
                info!(number, "restart requested");
                self.post(PanelEvent::Notice {
                    message: format!(
                        "Restarting from message {number} is not supported by the generation server."
                    ),
                });
            }
            PanelCommand::OpenCode { content, lang } => {
                match write_scratch_file(&self.scratch_dir, &content, &lang) {
                    Ok(path) => self.post(PanelEvent::Notice {
                        message: format!("Opened {lang} code in {}", path.display()),
                    }),
                    Err(err) => {
                        warn!(error = %err, "writing scratch file failed");
                        self.post(PanelEvent::Error {
                            message: format!("Could not open code: {err}"),
                        });
                    }
                }
            }
        }
    }

    fn report_idle(&self) {
        self.post(PanelEvent::SessionState {
            state: ReportedState::Idle,
            message: None,
        });
    }
}

#[cfg(test)]
#[path = "../tests/unit/host_tests.rs"]
mod tests;
