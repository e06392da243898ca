//! The per-client sync loop.
//!
//! One cooperative task per client multiplexes the store change feed with tiered polls,
//! the local question timer and commands from the owner of the [`SessionClient`]. Both
//! push and poll feed the same [`SessionView::reconcile`], so whichever arrives first
//! wins and the other merges as a no-op. A dropped feed is only logged; polling keeps
//! the view converging until the next resubscription.

use std::{collections::VecDeque, future::pending};

use futures::{StreamExt, stream::BoxStream};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    client::{
        ClientError,
        readiness::{GateOutcome, ReadinessGate},
        role::{Capability, ClientRole},
        timer::{AnswerWindow, QuestionTimer, TimerEvent},
        view::{ActiveQuestion, Delta, Reconciled, SessionView, ViewChange},
    },
    dao::{
        models::{SessionEntity, SessionStatus},
        session_store::{ChangeFilter, RowChange},
    },
    dto::{answer::SubmitAnswerRequest, results::ResultRow},
    error::ServiceError,
    services::{
        answer_service::{self, SubmitOutcome},
        participant_service, quiz_service, ranking_service, report_service,
        session_service::{self, ControllerOp},
    },
    state::SharedState,
};

const COMMAND_CAPACITY: usize = 16;

/// Notifications a client UI reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A new question is in play and its local countdown started.
    QuestionStarted {
        /// Question now in play.
        question_id: Uuid,
        /// Its countdown in seconds, zero when untimed.
        time_limit_sec: u32,
    },
    /// The local countdown ran out. `correct_option` is set when reveal is enabled.
    AnswerWindowClosed {
        /// Question whose window closed.
        question_id: Uuid,
        /// Correct option, when revealed.
        correct_option: Option<Uuid>,
    },
    /// The controller paused the session.
    Paused,
    /// The controller resumed the session.
    Resumed,
    /// The session reached Ended; results follow.
    SessionEnded,
    /// Navigate to the results view. `timed_out` means the ranking was not seen in time.
    ResultsReady {
        /// Ranking rows, possibly empty on timeout.
        results: Vec<ResultRow>,
        /// The readiness gate gave up.
        timed_out: bool,
    },
}

enum Command {
    Answer {
        option_id: Uuid,
        reply: oneshot::Sender<Result<SubmitOutcome, ClientError>>,
    },
    Drive {
        op: ControllerOp,
        reply: oneshot::Sender<Result<SessionEntity, ClientError>>,
    },
}

/// Handle to a running session client.
///
/// Dropping the handle stops the background task.
pub struct SessionClient {
    session_id: Uuid,
    role: ClientRole,
    view: watch::Receiver<SessionView>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SessionClient {
    /// Load the session, open the change feed and start the sync loop.
    pub async fn connect(
        state: SharedState,
        session_id: Uuid,
        role: ClientRole,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let session = session_service::get_session(&state, session_id).await?;
        if let Some(participant_id) = role.participant_id() {
            let participants = participant_service::list_participants(&state, session_id).await?;
            if !participants.iter().any(|participant| participant.id == participant_id) {
                return Err(ServiceError::NotFound(format!(
                    "participant `{participant_id}` is not part of this session"
                ))
                .into());
            }
        }

        let (events, events_rx) = mpsc::unbounded_channel();
        let (published, view) = watch::channel(SessionView::default());
        let (commands, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let mut worker = Worker {
            state,
            session_id,
            role,
            view: SessionView::default(),
            published,
            events,
            timer: QuestionTimer::new(),
            feed: None,
            gate: None,
            pending: VecDeque::new(),
        };
        // Subscribe before the first fetch so no change falls between the two.
        worker.resubscribe().await;
        worker.apply(Delta::Session(session)).await;
        worker.poll_presence().await;

        info!(%session_id, ?role, "session client connected");
        let task = tokio::spawn(worker.run(commands_rx));
        Ok((
            Self {
                session_id,
                role,
                view,
                commands,
                task,
            },
            events_rx,
        ))
    }

    /// Session this client follows.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Role the client acts under.
    pub fn role(&self) -> ClientRole {
        self.role
    }

    /// Latest reconciled snapshot.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver that sees every new snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Answer the question in play. Participants only.
    pub async fn answer(&self, option_id: Uuid) -> Result<SubmitOutcome, ClientError> {
        self.request(|reply| Command::Answer { option_id, reply })
            .await
    }

    /// Apply a controller operation. Controllers only.
    pub async fn drive(&self, op: ControllerOp) -> Result<SessionEntity, ClientError> {
        self.request(|reply| Command::Drive { op, reply }).await
    }

    /// Start the session.
    pub async fn start(&self) -> Result<SessionEntity, ClientError> {
        self.drive(ControllerOp::Start).await
    }

    /// Move to the next question.
    pub async fn advance(&self) -> Result<SessionEntity, ClientError> {
        self.drive(ControllerOp::Advance).await
    }

    /// Pause the question in play.
    pub async fn pause(&self) -> Result<SessionEntity, ClientError> {
        self.drive(ControllerOp::Pause).await
    }

    /// Resume after a pause.
    pub async fn resume(&self) -> Result<SessionEntity, ClientError> {
        self.drive(ControllerOp::Resume).await
    }

    /// End the session.
    pub async fn end(&self) -> Result<SessionEntity, ClientError> {
        self.drive(ControllerOp::End).await
    }

    /// Stop the sync loop and wait for it to finish.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        let _ = task.await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ClientError::Stopped)?;
        response.await.map_err(|_| ClientError::Stopped)?
    }
}

struct Worker {
    state: SharedState,
    session_id: Uuid,
    role: ClientRole,
    view: SessionView,
    published: watch::Sender<SessionView>,
    events: mpsc::UnboundedSender<ClientEvent>,
    timer: QuestionTimer,
    feed: Option<BoxStream<'static, RowChange>>,
    gate: Option<JoinHandle<GateOutcome<Vec<ResultRow>>>>,
    pending: VecDeque<Delta>,
}

async fn next_change(feed: &mut Option<BoxStream<'static, RowChange>>) -> Option<RowChange> {
    match feed {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn gate_outcome(
    gate: &mut Option<JoinHandle<GateOutcome<Vec<ResultRow>>>>,
) -> GateOutcome<Vec<ResultRow>> {
    match gate {
        Some(handle) => handle.await.unwrap_or(GateOutcome::TimedOut),
        None => pending().await,
    }
}

/// Load the question in play. `Worker` is not `Sync`, so it must not be borrowed across the await.
async fn fetch_question(state: &SharedState, question_id: Uuid) -> Option<Delta> {
    match quiz_service::load_question(state, question_id).await {
        Ok((question, options)) => Some(Delta::Question(ActiveQuestion { question, options })),
        Err(err) => {
            debug!(%question_id, error = %err, "question not loaded; retrying on next poll");
            None
        }
    }
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let cadence = self.state.config().sync.clone();
        let mut presence = interval(cadence.presence_poll);
        let mut session_tick = interval(cadence.session_poll);
        let mut timer_tick = interval(cadence.timer_tick);
        for ticker in [&mut presence, &mut session_tick, &mut timer_tick] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                change = next_change(&mut self.feed) => match change {
                    Some(change) => {
                        if let Some(delta) = Delta::from_change(&change) {
                            self.apply(delta).await;
                        }
                    }
                    None => {
                        debug!(session_id = %self.session_id, "change feed ended; polling until resubscribed");
                        self.feed = None;
                    }
                },
                _ = presence.tick() => self.poll_presence().await,
                _ = session_tick.tick() => {
                    if self.feed.is_none() {
                        self.resubscribe().await;
                    }
                    self.poll_session().await;
                }
                _ = timer_tick.tick() => self.check_timer().await,
                outcome = gate_outcome(&mut self.gate) => {
                    self.gate = None;
                    self.finish_gate(outcome).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Answer { option_id, reply }) => {
                        let _ = reply.send(self.answer(option_id).await);
                    }
                    Some(Command::Drive { op, reply }) => {
                        let _ = reply.send(self.drive(op).await);
                    }
                    None => break,
                },
            }
        }

        if let Some(gate) = self.gate.take() {
            gate.abort();
        }
        self.timer.stop();
        debug!(session_id = %self.session_id, "session client stopped");
    }

    fn emit(&self, event: ClientEvent) {
        // The UI may have gone away; the loop keeps running until the handle drops.
        let _ = self.events.send(event);
    }

    /// Merge `delta` and every follow-up delta its reactions produce, in order.
    async fn apply(&mut self, delta: Delta) {
        self.pending.push_back(delta);
        while let Some(delta) = self.pending.pop_front() {
            let Some(Reconciled { view, changes }) = self.view.reconcile(delta) else {
                continue;
            };
            self.view = view;
            self.published.send_replace(self.view.clone());
            for change in changes {
                self.react(change).await;
            }
        }
    }

    async fn react(&mut self, change: ViewChange) {
        let now = Instant::now();
        match change {
            ViewChange::QuestionChanged {
                question_id: Some(question_id),
                time_limit_sec,
            } => {
                self.timer.start(question_id, time_limit_sec, now);
                if self.view.status() == Some(SessionStatus::Paused) {
                    self.timer.freeze(now);
                }
                self.emit(ClientEvent::QuestionStarted {
                    question_id,
                    time_limit_sec,
                });
                if let Some(delta) = fetch_question(&self.state, question_id).await {
                    self.pending.push_back(delta);
                }
            }
            ViewChange::QuestionChanged {
                question_id: None, ..
            } => self.timer.stop(),
            ViewChange::Status {
                to: SessionStatus::Paused,
                ..
            } => {
                self.timer.freeze(now);
                self.emit(ClientEvent::Paused);
            }
            ViewChange::Status {
                from: Some(SessionStatus::Paused),
                to: SessionStatus::Running,
            } => {
                self.timer.resume(now);
                self.emit(ClientEvent::Resumed);
            }
            ViewChange::Status {
                to: SessionStatus::Ended,
                ..
            } => {
                self.timer.stop();
                self.emit(ClientEvent::SessionEnded);
                self.open_results_gate();
            }
            _ => {}
        }
    }

    async fn resubscribe(&mut self) {
        let Ok(store) = self.state.require_session_store().await else {
            return;
        };
        match store.subscribe(ChangeFilter::session(self.session_id)).await {
            Ok(feed) => self.feed = Some(feed),
            Err(err) => debug!(session_id = %self.session_id, error = %err, "change feed unavailable"),
        }
    }

    async fn poll_presence(&mut self) {
        let Ok(store) = self.state.require_session_store().await else {
            return;
        };
        match store.list_participants(self.session_id).await {
            Ok(participants) => self.apply(Delta::Participants(participants)).await,
            Err(err) => debug!(session_id = %self.session_id, error = %err, "participant poll failed"),
        }
        match store.list_scores(self.session_id).await {
            Ok(scores) => self.apply(Delta::Scores(scores)).await,
            Err(err) => debug!(session_id = %self.session_id, error = %err, "score poll failed"),
        }
    }

    async fn poll_session(&mut self) {
        match session_service::get_session(&self.state, self.session_id).await {
            Ok(session) => self.apply(Delta::Session(session)).await,
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "session poll failed");
                return;
            }
        }

        let Some(question_id) = self.view.current_question_id() else {
            return;
        };
        if self.view.question.is_none() {
            if let Some(delta) = fetch_question(&self.state, question_id).await {
                self.apply(delta).await;
            }
        }

        let tally_owner = self
            .role
            .owner_id()
            .filter(|_| self.role.allows(Capability::ViewAnswerTally));
        if let Some(owner_id) = tally_owner {
            match report_service::question_stats(&self.state, owner_id, self.session_id, question_id)
                .await
            {
                Ok(stats) => self.apply(Delta::Tally(stats)).await,
                Err(err) => debug!(%question_id, error = %err, "answer tally poll failed"),
            }
        }
    }

    async fn check_timer(&mut self) {
        let Some(TimerEvent::Expired { question_id }) = self.timer.poll(Instant::now()) else {
            return;
        };
        let correct_option = if self.state.config().timer.reveal_on_timeout {
            self.view
                .question
                .as_ref()
                .filter(|active| active.question.id == question_id)
                .and_then(ActiveQuestion::correct_option)
        } else {
            None
        };
        if let Some(option_id) = correct_option {
            self.apply(Delta::Reveal {
                question_id,
                option_id,
            })
            .await;
        }
        debug!(session_id = %self.session_id, %question_id, "local answer window closed");
        self.emit(ClientEvent::AnswerWindowClosed {
            question_id,
            correct_option,
        });
    }

    fn open_results_gate(&mut self) {
        if self.gate.is_some() || self.view.results.is_some() {
            return;
        }
        let gate = ReadinessGate::new(&self.state.config().results_gate);
        let state = self.state.clone();
        let session_id = self.session_id;
        self.gate = Some(tokio::spawn(async move {
            gate.wait(|| {
                let state = state.clone();
                async move {
                    ranking_service::results(&state, session_id)
                        .await
                        .ok()
                        .filter(|rows| !rows.is_empty())
                }
            })
            .await
        }));
    }

    async fn finish_gate(&mut self, outcome: GateOutcome<Vec<ResultRow>>) {
        match outcome {
            GateOutcome::Ready(results) => {
                self.apply(Delta::Results(results.clone())).await;
                self.emit(ClientEvent::ResultsReady {
                    results,
                    timed_out: false,
                });
            }
            GateOutcome::TimedOut => {
                debug!(session_id = %self.session_id, "results not ready in time; navigating anyway");
                self.emit(ClientEvent::ResultsReady {
                    results: Vec::new(),
                    timed_out: true,
                });
            }
        }
    }

    async fn answer(&mut self, option_id: Uuid) -> Result<SubmitOutcome, ClientError> {
        self.role.require(Capability::SubmitAnswer)?;
        let Some(participant_id) = self.role.participant_id() else {
            return Err(ClientError::NotPermitted(Capability::SubmitAnswer));
        };
        let question_id = self
            .view
            .current_question_id()
            .ok_or(ClientError::NoActiveQuestion)?;

        // The cached status may lag a controller transition that raced the local timer.
        let fresh = session_service::get_session(&self.state, self.session_id).await?;
        let (status, current) = (fresh.status, fresh.current_question_id);
        self.apply(Delta::Session(fresh)).await;
        if current != Some(question_id) || status == SessionStatus::Ended {
            return Err(ClientError::QuestionClosed);
        }
        if self.view.answer.is_some() {
            return Ok(SubmitOutcome::AlreadyAnswered);
        }

        let now = Instant::now();
        if status != SessionStatus::Running || self.timer.window(now) != AnswerWindow::Open {
            return Err(ClientError::WindowClosed);
        }
        let elapsed_ms = u64::try_from(self.timer.elapsed(now).as_millis()).unwrap_or(u64::MAX);

        let outcome = answer_service::submit_answer(
            &self.state,
            self.session_id,
            SubmitAnswerRequest {
                participant_id,
                question_id,
                option_id,
                elapsed_ms,
            },
        )
        .await?;
        if let SubmitOutcome::Recorded { .. } = outcome {
            self.apply(Delta::Answered {
                question_id,
                option_id,
            })
            .await;
        }
        Ok(outcome)
    }

    async fn drive(&mut self, op: ControllerOp) -> Result<SessionEntity, ClientError> {
        self.role.require(Capability::DriveSession)?;
        let Some(owner_id) = self.role.owner_id() else {
            return Err(ClientError::NotPermitted(Capability::DriveSession));
        };
        let session = session_service::drive(&self.state, owner_id, self.session_id, op).await?;
        self.apply(Delta::Session(session.clone())).await;
        Ok(session)
    }
}
