use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{QuestionEntity, SessionEntity, SessionStatus};

/// Question about to be put in play, with the countdown it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCursor {
    /// Question to put in play.
    pub question_id: Uuid,
    /// Its countdown in seconds.
    pub time_limit_sec: u32,
}

impl From<&QuestionEntity> for QuestionCursor {
    fn from(question: &QuestionEntity) -> Self {
        Self {
            question_id: question.id,
            time_limit_sec: question.time_limit_sec,
        }
    }
}

/// Events that can be applied to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Leave the lobby and put the first question in play.
    Start {
        /// First question by `order_index`.
        first: QuestionCursor,
    },
    /// Move to the following question, or end the session when there is none.
    Advance {
        /// Next question by `order_index`, if any.
        next: Option<QuestionCursor>,
    },
    /// Freeze the current question.
    Pause,
    /// Unfreeze the current question.
    Resume,
    /// Close the session.
    End,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the invalid event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

/// A validated transition together with the row to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Status the session is currently in.
    pub from: SessionStatus,
    /// Status the session will transition to.
    pub to: SessionStatus,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Updated session row, with its version bumped.
    pub next: SessionEntity,
}

/// Compute the status reached by applying `event` in `from`, if allowed.
pub fn compute_transition(from: SessionStatus, event: &SessionEvent) -> Option<SessionStatus> {
    use SessionEvent as E;
    use SessionStatus as S;

    match (from, event) {
        (S::Lobby, E::Start { .. }) => Some(S::Running),
        (S::Running, E::Advance { next: Some(_) }) => Some(S::Running),
        (S::Running, E::Advance { next: None }) => Some(S::Ended),
        (S::Running, E::Pause) => Some(S::Paused),
        (S::Paused, E::Resume) => Some(S::Running),
        (S::Lobby | S::Running | S::Paused, E::End) => Some(S::Ended),
        _ => None,
    }
}

/// Validate `event` against `session` and build the row to persist.
///
/// `current_question_id` is set while a question is in play (`Running` or `Paused`)
/// and cleared on entering `Ended`.
pub fn plan(
    session: &SessionEntity,
    event: SessionEvent,
    now: SystemTime,
) -> Result<Plan, InvalidTransition> {
    let from = session.status;
    let Some(to) = compute_transition(from, &event) else {
        return Err(InvalidTransition { from, event });
    };

    let mut next = session.clone();
    next.status = to;
    next.version = session.version + 1;

    match &event {
        SessionEvent::Start { first } => {
            next.current_question_id = Some(first.question_id);
            next.time_limit_sec = first.time_limit_sec;
            next.started_at = Some(now);
        }
        SessionEvent::Advance { next: Some(cursor) } => {
            next.current_question_id = Some(cursor.question_id);
            next.time_limit_sec = cursor.time_limit_sec;
        }
        SessionEvent::Advance { next: None } | SessionEvent::End => {
            next.current_question_id = None;
            next.ended_at = Some(now);
        }
        SessionEvent::Pause | SessionEvent::Resume => {}
    }

    Ok(Plan {
        from,
        to,
        event,
        next,
    })
}

/// Whether the question pointer agrees with the status.
pub fn question_pointer_consistent(session: &SessionEntity) -> bool {
    let in_play = matches!(
        session.status,
        SessionStatus::Running | SessionStatus::Paused
    );
    session.current_question_id.is_some() == in_play
}
