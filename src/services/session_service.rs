use std::{sync::Arc, time::SystemTime};

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{SessionEntity, SessionResultEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::validation::JOIN_CODE_LEN,
    error::ServiceError,
    services::ranking_service,
    state::{SessionEvent, SharedState, session_machine},
};

const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Controller operations that mutate a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerOp {
    /// Lobby to Running on the first question.
    Start,
    /// Next question, or Ended after the last one.
    Advance,
    /// Running to Paused.
    Pause,
    /// Paused to Running.
    Resume,
    /// Any live status to Ended.
    End,
}

/// Draw a random upper-case alphanumeric join code.
pub fn generate_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Open a lobby for `quiz_id`, owned by `owner_id`.
pub async fn create_session(
    state: &SharedState,
    owner_id: Uuid,
    quiz_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let quiz = store
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;
    if quiz.owner_id != owner_id {
        return Err(ServiceError::PermissionDenied(
            "only the quiz owner can open a session".into(),
        ));
    }

    let attempts = state.config().sessions.join_code_attempts.max(1);
    for attempt in 1..=attempts {
        let code = generate_join_code(&mut rand::rng());
        let session = SessionEntity::lobby(quiz_id, owner_id, code, SystemTime::now());
        match store.insert_session(session.clone()).await {
            Ok(()) => {
                info!(session_id = %session.id, code = %session.code, %quiz_id, "session created");
                return Ok(session);
            }
            Err(err) if err.is_unique_violation() => {
                debug!(attempt, "join code collision; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(%quiz_id, attempts, "could not allocate a unique join code");
    Err(ServiceError::Conflict(
        "could not allocate a unique join code".into(),
    ))
}

/// Load a session by id.
pub async fn get_session(state: &SharedState, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(store.as_ref(), session_id).await
}

/// Load a session by its join code, in any case.
pub async fn find_by_code(state: &SharedState, code: &str) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_session_by_code(code.trim().to_uppercase())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no session with code `{code}`")))
}

/// Sessions the caller opened, newest first.
pub async fn list_owned_sessions(
    state: &SharedState,
    caller: Uuid,
) -> Result<Vec<SessionEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    Ok(store.list_sessions_by_owner(caller).await?)
}

/// Put the first question in play.
pub async fn start(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    drive(state, caller, session_id, ControllerOp::Start).await
}

/// Move to the next question, ending the session after the last one.
pub async fn advance(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    drive(state, caller, session_id, ControllerOp::Advance).await
}

/// Freeze the question in play. Answers are refused until [`resume`].
pub async fn pause(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    drive(state, caller, session_id, ControllerOp::Pause).await
}

/// Reopen the paused question.
pub async fn resume(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    drive(state, caller, session_id, ControllerOp::Resume).await
}

/// End the session and persist its ranking.
pub async fn end(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    drive(state, caller, session_id, ControllerOp::End).await
}

/// Rerun the ranking of an ended session. Upserts, so results only change if inputs did.
pub async fn recompute_results(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<Vec<SessionResultEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    state
        .run_transition(session_id, || async move {
            let session = load_owned(store.as_ref(), caller, session_id).await?;
            if session.status != SessionStatus::Ended {
                return Err(ServiceError::InvalidState(
                    "results can only be computed once the session has ended".into(),
                ));
            }
            ranking_service::finalize(store.as_ref(), &session).await
        })
        .await
}

/// Apply a controller operation, dispatching by op.
pub async fn drive(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
    op: ControllerOp,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    state
        .run_transition(session_id, || apply_op(store, caller, session_id, op))
        .await
}

async fn apply_op(
    store: Arc<dyn SessionStore>,
    caller: Uuid,
    session_id: Uuid,
    op: ControllerOp,
) -> Result<SessionEntity, ServiceError> {
    let session = load_owned(store.as_ref(), caller, session_id).await?;

    if session.status.is_terminal() {
        match op {
            ControllerOp::Advance => {
                debug!(%session_id, "advance on ended session ignored");
                return Ok(session);
            }
            ControllerOp::End => {
                // Repeated end keeps the session as is; the idempotent ranking run repairs
                // a previous run that failed after the status was persisted.
                debug!(%session_id, "end on ended session; refreshing results");
                ranking_service::finalize(store.as_ref(), &session).await?;
                return Ok(session);
            }
            _ => {}
        }
    }

    let event = match op {
        ControllerOp::Start => {
            if session.status != SessionStatus::Lobby {
                return Err(ServiceError::InvalidState(format!(
                    "session cannot start while {:?}",
                    session.status
                )));
            }
            let questions = store.list_questions(session.quiz_id).await?;
            let first = questions.first().ok_or_else(|| {
                ServiceError::Validation("quiz has no questions to play".into())
            })?;
            SessionEvent::Start {
                first: first.into(),
            }
        }
        ControllerOp::Advance => {
            let questions = store.list_questions(session.quiz_id).await?;
            let next = match session.current_question_id {
                Some(current_id) => {
                    let current = questions
                        .iter()
                        .find(|question| question.id == current_id)
                        .ok_or_else(|| {
                            warn!(%session_id, question_id = %current_id, "question in play is missing from the quiz");
                            ServiceError::NotFound(format!(
                                "question `{current_id}` in play is not part of the quiz"
                            ))
                        })?;
                    questions
                        .iter()
                        .find(|question| question.order_index > current.order_index)
                        .map(Into::into)
                }
                None => None,
            };
            SessionEvent::Advance { next }
        }
        ControllerOp::Pause => SessionEvent::Pause,
        ControllerOp::Resume => SessionEvent::Resume,
        ControllerOp::End => SessionEvent::End,
    };

    let plan = session_machine::plan(&session, event, SystemTime::now())?;
    if !store
        .update_session(plan.next.clone(), session.version)
        .await?
    {
        return Err(ServiceError::Conflict(
            "session was modified concurrently".into(),
        ));
    }
    info!(
        %session_id,
        from = ?plan.from,
        to = ?plan.to,
        question_id = ?plan.next.current_question_id,
        "session transition applied"
    );

    if plan.to == SessionStatus::Ended {
        ranking_service::finalize(store.as_ref(), &plan.next).await?;
    }

    Ok(plan.next)
}

async fn load_session(store: &dyn SessionStore, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

/// Load a session and check that `caller` owns it.
pub(crate) async fn load_owned(
    store: &dyn SessionStore,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let session = load_session(store, session_id).await?;
    if session.owner_id != caller {
        warn!(%session_id, %caller, "controller operation refused for non-owner");
        return Err(ServiceError::PermissionDenied(
            "only the session owner can drive it".into(),
        ));
    }
    Ok(session)
}
