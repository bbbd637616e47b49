//! Session protocol client.
//!
//! One query at a time per [`SessionClient`]. A spawned reader task owns the
//! response stream and is the only writer of protocol state; cancellation
//! reaches it through a [`CancellationToken`] and resolves the shared
//! [`CompletionSignal`] directly, so whichever of cancel, finish frame, end
//! of stream or failure gets there first decides the outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::transport::{Endpoint, Transport};
use crate::wire::{Frame, Message, QueryParams, Request, SessionStatus, StopRequest};

/// Receives everything a running session produces. Called from the reader
/// task, never while session locks are held, so implementations may call
/// back into [`SessionHandle::cancel`].
pub trait SessionObserver: Send + Sync {
    fn on_messages(&self, messages: Vec<Message>);
    fn on_error(&self, error: &ClientError);
    fn on_no_reference(&self, junit_version: &str);
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// The server sent `status: finish`.
    Finished,
    /// The stream closed after start without a finish status.
    Ended,
    Cancelled,
    Failed(ClientError),
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolState {
    BeforeStart,
    Started { session_id: Option<String> },
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Started(Option<String>),
    Messages(Vec<Message>),
    NoReference(String),
    Finished,
    Ignored,
}

impl ProtocolState {
    pub fn advance(&mut self, frame: Frame) -> Result<Step, ClientError> {
        match self {
            Self::BeforeStart => match frame {
                Frame::Status {
                    status: SessionStatus::Start,
                    session_id,
                } => {
                    *self = Self::Started {
                        session_id: session_id.clone(),
                    };
                    Ok(Step::Started(session_id))
                }
                other => Err(ClientError::protocol(format!(
                    "expected a start status, received {}",
                    other.kind()
                ))),
            },
            Self::Started { .. } => match frame {
                Frame::Status {
                    status: SessionStatus::Start,
                    ..
                } => Err(ClientError::protocol("duplicate start status")),
                Frame::Status {
                    status: SessionStatus::Finish,
                    ..
                } => {
                    *self = Self::Finished;
                    Ok(Step::Finished)
                }
                Frame::MessageBatch { messages, .. } => Ok(Step::Messages(messages)),
                Frame::NoReference { junit_version, .. } => Ok(Step::NoReference(junit_version)),
            },
            // Late frames on a still-open connection are expected noise.
            Self::Finished => Ok(Step::Ignored),
        }
    }
}

/// One-shot completion shared between the reader and cancellers. The first
/// `resolve` wins; later calls return `false`.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<SessionOutcome>>>>,
}

impl CompletionSignal {
    pub fn channel() -> (Self, oneshot::Receiver<SessionOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub fn resolve(&self, outcome: SessionOutcome) -> bool {
        let Some(sender) = lock(&self.sender).take() else {
            return false;
        };
        // The receiver may already be gone if the caller dropped the query.
        let _ = sender.send(outcome);
        true
    }

    #[cfg(test)]
    pub fn is_resolved(&self) -> bool {
        lock(&self.sender).is_none()
    }
}

#[derive(Debug)]
struct PendingRequest {
    query_id: u64,
    token: CancellationToken,
    completion: CompletionSignal,
    cancelling: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct SessionShared {
    pending: Mutex<Option<PendingRequest>>,
    session_id: Mutex<Option<String>>,
    next_query_id: AtomicU64,
}

impl SessionShared {
    fn begin(&self, make: impl FnOnce(u64) -> PendingRequest) -> Result<u64, ClientError> {
        let mut pending = lock(&self.pending);
        if pending.is_some() {
            return Err(ClientError::QueryInFlight);
        }
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        *pending = Some(make(query_id));
        *lock(&self.session_id) = None;
        Ok(query_id)
    }

    fn release(&self, query_id: u64) -> Option<PendingRequest> {
        let mut pending = lock(&self.pending);
        if pending
            .as_ref()
            .is_some_and(|request| request.query_id == query_id)
        {
            pending.take()
        } else {
            None
        }
    }

    fn record_session_id(&self, query_id: u64, session_id: Option<String>) {
        let pending = lock(&self.pending);
        if pending
            .as_ref()
            .is_some_and(|request| request.query_id == query_id)
        {
            *lock(&self.session_id) = session_id;
        }
    }

    fn clear_session_id(&self) {
        *lock(&self.session_id) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancellation side of a [`SessionClient`]. Cheap to clone and safe to use
/// from any thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    transport: Transport,
}

impl SessionHandle {
    /// Aborts the in-flight query, if any. Idempotent.
    pub fn cancel(&self) {
        let Some(pending) = lock(&self.shared.pending).take() else {
            debug!("cancel requested without an active query");
            return;
        };
        pending.cancelling.store(true, Ordering::SeqCst);
        pending.token.cancel();
        self.shared.clear_session_id();
        if pending.completion.resolve(SessionOutcome::Cancelled) {
            info!(query_id = pending.query_id, "query cancelled");
        } else {
            debug!(query_id = pending.query_id, "query already completed before cancel");
        }
    }

    /// Cancels, then tells the server to stop the last known session. Never
    /// fails from the caller's point of view.
    pub async fn stop_session(&self) {
        let session_id = self.session_id();
        self.cancel();
        let Some(session_id) = session_id else {
            debug!("no session id captured; skipping stop signal");
            return;
        };
        if let Err(err) = self.send_stop_signal(&session_id).await {
            warn!(error = %err, "stop signal was not delivered");
        }
    }

    pub async fn send_stop_signal(&self, session_id: &str) -> Result<(), ClientError> {
        let request = StopRequest { session_id };
        match self.transport.send(Endpoint::StopSession, &request).await {
            Ok(response) => {
                debug!(session_id, status = %response.status(), "stop signal sent");
                Ok(())
            }
            Err(err) => Err(ClientError::StopSignal {
                session_id: session_id.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.shared.session_id).clone()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared.pending).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SessionClient {
    handle: SessionHandle,
}

impl SessionClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            handle: SessionHandle {
                shared: Arc::new(SessionShared::default()),
                transport,
            },
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    #[cfg(test)]
    pub fn session_id(&self) -> Option<String> {
        self.handle.session_id()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub async fn stop_active_session(&self) {
        self.handle.stop_session().await;
    }

    pub async fn change_junit_version(&self, version: &str) -> Result<(), ClientError> {
        self.handle
            .transport
            .post(Endpoint::JunitVersion, &Request::ChangeJunitVersion(version))
            .await?;
        info!(version, "junit version changed");
        Ok(())
    }

    /// Claims the client for one query. Until the ticket is run or dropped,
    /// other reservations fail with [`ClientError::QueryInFlight`] and
    /// [`SessionHandle::cancel`] already applies to it.
    pub fn reserve(&self) -> Result<QueryTicket, ClientError> {
        let (completion, completed) = CompletionSignal::channel();
        let token = CancellationToken::new();
        let cancelling = Arc::new(AtomicBool::new(false));
        let shared = self.handle.shared.clone();
        let query_id = shared.begin(|query_id| PendingRequest {
            query_id,
            token: token.clone(),
            completion: completion.clone(),
            cancelling: cancelling.clone(),
        })?;
        debug!(query_id, "query reserved");
        Ok(QueryTicket {
            shared,
            query_id,
            token,
            completion,
            completed: Some(completed),
            cancelling,
        })
    }

    /// Runs one query to completion. Transport and protocol failures are
    /// reported to `observer` and come back as [`SessionOutcome::Failed`];
    /// the only `Err` is [`ClientError::QueryInFlight`].
    pub async fn start_query(
        &self,
        params: &QueryParams,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SessionOutcome, ClientError> {
        let ticket = self.reserve()?;
        Ok(self.run_reserved(ticket, params, observer).await)
    }

    pub async fn run_reserved(
        &self,
        mut ticket: QueryTicket,
        params: &QueryParams,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionOutcome {
        let query_id = ticket.query_id;
        let Some(completed) = ticket.completed.take() else {
            return SessionOutcome::Ended;
        };
        let reader = QueryReader {
            transport: self.handle.transport.clone(),
            shared: ticket.shared.clone(),
            query_id,
            token: ticket.token.clone(),
            completion: ticket.completion.clone(),
            cancelling: ticket.cancelling.clone(),
            observer,
        };
        let task = tokio::spawn(reader.run(params.clone()));

        let outcome = completed.await.unwrap_or(SessionOutcome::Ended);
        // The reader drops its stream as soon as it sees the outcome, so this
        // returns promptly and guarantees the socket is gone.
        if let Err(err) = task.await {
            warn!(query_id, error = %err, "query reader did not exit cleanly");
        }
        ticket.shared.release(query_id);
        info!(query_id, outcome = outcome.label(), "query completed");
        outcome
    }
}

/// A reserved query slot from [`SessionClient::reserve`]. Dropping it
/// unrun frees the slot.
#[derive(Debug)]
pub struct QueryTicket {
    shared: Arc<SessionShared>,
    query_id: u64,
    token: CancellationToken,
    completion: CompletionSignal,
    completed: Option<oneshot::Receiver<SessionOutcome>>,
    cancelling: Arc<AtomicBool>,
}

impl Drop for QueryTicket {
    fn drop(&mut self) {
        if self.shared.release(self.query_id).is_some() {
            debug!(query_id = self.query_id, "query slot released");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct QueryReader {
    transport: Transport,
    shared: Arc<SessionShared>,
    query_id: u64,
    token: CancellationToken,
    completion: CompletionSignal,
    cancelling: Arc<AtomicBool>,
    observer: Arc<dyn SessionObserver>,
}

impl QueryReader {
    async fn run(self, params: QueryParams) {
        let request = Request::Query(&params);
        let opened = tokio::select! {
            biased;
            _ = self.token.cancelled() => return,
            opened = self.transport.open_stream(Endpoint::Session, &request) => opened,
        };
        let mut frames = match opened {
            Ok(frames) => frames,
            Err(err) => return self.fail(err.into()),
        };

        let mut state = ProtocolState::BeforeStart;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(query_id = self.query_id, "dropping stream after cancel");
                    return;
                }
                next = frames.next_frame() => next,
            };
            if self.is_cancelling() {
                return;
            }
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return self.end_of_stream(&state),
                Err(err) => return self.fail(err),
            };
            debug!(query_id = self.query_id, frame = frame.kind(), "frame received");
            match state.advance(frame) {
                Ok(step) => {
                    if self.apply(step) == Flow::Stop {
                        return;
                    }
                }
                Err(err) => return self.fail(err),
            }
        }
    }

    fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::SeqCst) || self.token.is_cancelled()
    }

    fn apply(&self, step: Step) -> Flow {
        match step {
            Step::Started(session_id) => {
                info!(query_id = self.query_id, session_id = ?session_id, "session started");
                self.shared.record_session_id(self.query_id, session_id);
                Flow::Continue
            }
            Step::Messages(messages) => {
                self.observer.on_messages(messages);
                Flow::Continue
            }
            Step::NoReference(junit_version) => {
                info!(query_id = self.query_id, %junit_version, "no reference test case");
                self.observer.on_no_reference(&junit_version);
                Flow::Continue
            }
            Step::Finished => {
                self.shared.clear_session_id();
                self.completion.resolve(SessionOutcome::Finished);
                self.shared.release(self.query_id);
                Flow::Stop
            }
            Step::Ignored => Flow::Continue,
        }
    }

    fn end_of_stream(&self, state: &ProtocolState) {
        match state {
            ProtocolState::BeforeStart => self.fail(ClientError::protocol(
                "stream ended before the session started",
            )),
            ProtocolState::Started { .. } => {
                warn!(query_id = self.query_id, "stream ended without a finish status");
                self.shared.clear_session_id();
                self.completion.resolve(SessionOutcome::Ended);
                self.shared.release(self.query_id);
            }
            ProtocolState::Finished => {}
        }
    }

    fn fail(&self, err: ClientError) {
        if self.is_cancelling() {
            debug!(query_id = self.query_id, error = %err, "ignoring error after cancel");
            return;
        }
        error!(query_id = self.query_id, error = %err, "query aborted");
        self.observer.on_error(&err);
        self.shared.clear_session_id();
        self.completion.resolve(SessionOutcome::Failed(err));
        self.shared.release(self.query_id);
    }
}

impl Drop for QueryReader {
    // Covers exits that resolved nothing, including a panicking observer.
    fn drop(&mut self) {
        if self.completion.resolve(SessionOutcome::Ended) {
            warn!(query_id = self.query_id, "query reader exited without an outcome");
        }
        self.shared.release(self.query_id);
    }
}

#[cfg(test)]
#[path = "../tests/unit/session_tests.rs"]
mod tests;
