use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{AnswerEntity, ScoreEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::answer::SubmitAnswerRequest,
    error::ServiceError,
    state::SharedState,
};

/// What happened to a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First submission for this question; `score` is set when points were awarded.
    Recorded {
        /// Whether the picked option is correct.
        correct: bool,
        /// Score after the award, when one was applied.
        score: Option<i64>,
    },
    /// An earlier submission stands and this one was discarded.
    AlreadyAnswered,
}

/// Record a participant's answer to the question in play and award points if correct.
///
/// A repeated submission is not an error: the first answer stands and the caller is
/// told it already answered.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    request: SubmitAnswerRequest,
) -> Result<SubmitOutcome, ServiceError> {
    request.validate()?;
    let store = state.require_session_store().await?;

    let session = store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    if session.status != SessionStatus::Running {
        return Err(ServiceError::Conflict(format!(
            "answers are not accepted while the session is {:?}",
            session.status
        )));
    }
    if session.current_question_id != Some(request.question_id) {
        debug!(
            %session_id,
            question_id = %request.question_id,
            "stale answer for a question no longer in play"
        );
        return Err(ServiceError::Conflict(
            "question is no longer in play".into(),
        ));
    }

    let participant = store
        .find_participant(request.participant_id)
        .await?
        .filter(|participant| participant.session_id == session_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "participant `{}` is not part of this session",
                request.participant_id
            ))
        })?;

    let option = store
        .find_option(request.option_id)
        .await?
        .filter(|option| option.question_id == request.question_id)
        .ok_or_else(|| {
            ServiceError::Validation(format!(
                "option `{}` does not belong to the question",
                request.option_id
            ))
        })?;

    let answer = AnswerEntity {
        session_id,
        question_id: request.question_id,
        participant_id: participant.id,
        option_id: option.id,
        elapsed_ms: clamp_elapsed(request.elapsed_ms, session.time_limit_sec),
        created_at: SystemTime::now(),
    };
    let points = state.config().scoring.correct_answer_points;
    match store.insert_answer(answer).await {
        Ok(()) => {}
        Err(err) if err.is_unique_violation() => {
            debug!(
                %session_id,
                participant_id = %participant.id,
                question_id = %request.question_id,
                "duplicate answer ignored"
            );
            settle_stored_award(
                store.as_ref(),
                session_id,
                participant.id,
                request.question_id,
                points,
            )
            .await?;
            return Ok(SubmitOutcome::AlreadyAnswered);
        }
        Err(err) => return Err(err.into()),
    }

    if !option.is_correct {
        return Ok(SubmitOutcome::Recorded {
            correct: false,
            score: None,
        });
    }

    let awarded = store
        .award_points(session_id, participant.id, request.question_id, points)
        .await?;
    if let Some(score) = &awarded {
        info!(
            %session_id,
            participant_id = %participant.id,
            question_id = %request.question_id,
            score = score.value,
            "points awarded"
        );
    }

    Ok(SubmitOutcome::Recorded {
        correct: true,
        score: awarded.map(|score| score.value),
    })
}

/// Client timings never exceed the countdown of the question they answer.
fn clamp_elapsed(elapsed_ms: u64, time_limit_sec: u32) -> u64 {
    if time_limit_sec == 0 {
        return elapsed_ms;
    }
    elapsed_ms.min(u64::from(time_limit_sec) * 1_000)
}

/// Re-apply the award of the answer already stored for this question.
///
/// An earlier submission may have been recorded without its award landing. The award
/// ledger turns the re-application into a no-op when it did land.
async fn settle_stored_award(
    store: &dyn SessionStore,
    session_id: Uuid,
    participant_id: Uuid,
    question_id: Uuid,
    points: i64,
) -> Result<Option<ScoreEntity>, ServiceError> {
    let stored = store
        .list_question_answers(session_id, question_id)
        .await?
        .into_iter()
        .find(|answer| answer.participant_id == participant_id);
    let Some(stored) = stored else {
        return Ok(None);
    };
    let correct = store
        .find_option(stored.option_id)
        .await?
        .is_some_and(|option| option.is_correct);
    if !correct {
        return Ok(None);
    }

    let repaired = store
        .award_points(session_id, participant_id, question_id, points)
        .await?;
    if let Some(score) = &repaired {
        warn!(
            %session_id,
            %participant_id,
            %question_id,
            score = score.value,
            "missing award applied on repeated answer"
        );
    }
    Ok(repaired)
}
