use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, OptionEntity, ParticipantEntity, QuestionEntity, ScoreEntity, SessionStatus,
    },
    dto::{
        question::PlayerQuestion,
        report::{OptionTally, ParticipantReport, QuestionReport, QuestionStats, SessionReport},
    },
    error::ServiceError,
    services::{quiz_service, ranking_service, session_service},
    state::SharedState,
};

/// Question currently in play, stripped of correctness flags.
///
/// `None` in the lobby and once the session has ended.
pub async fn current_question(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Option<PlayerQuestion>, ServiceError> {
    let session = session_service::get_session(state, session_id).await?;
    let Some(question_id) = session.current_question_id else {
        return Ok(None);
    };
    let (question, options) = quiz_service::load_question(state, question_id).await?;
    Ok(Some(PlayerQuestion::new(
        &question,
        &options,
        session.time_limit_sec,
    )))
}

/// Answer distribution of one question, visible to the session owner only.
pub async fn question_stats(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
    question_id: Uuid,
) -> Result<QuestionStats, ServiceError> {
    let store = state.require_session_store().await?;
    let session = session_service::load_owned(store.as_ref(), caller, session_id).await?;
    let (question, options) = quiz_service::load_question(state, question_id).await?;
    if question.quiz_id != session.quiz_id {
        return Err(ServiceError::NotFound(format!(
            "question `{question_id}` is not part of this session"
        )));
    }
    let answers = store.list_question_answers(session_id, question_id).await?;
    Ok(tally_options(question_id, &options, &answers))
}

pub(crate) fn tally_options(
    question_id: Uuid,
    options: &[OptionEntity],
    answers: &[AnswerEntity],
) -> QuestionStats {
    let mut counts: HashMap<Uuid, u32> = HashMap::new();
    for answer in answers.iter().filter(|answer| answer.question_id == question_id) {
        *counts.entry(answer.option_id).or_default() += 1;
    }
    QuestionStats {
        question_id,
        total_answers: counts.values().sum(),
        options: options
            .iter()
            .map(|option| OptionTally {
                option_id: option.id,
                text: option.text.clone(),
                is_correct: option.is_correct,
                count: counts.get(&option.id).copied().unwrap_or(0),
            })
            .collect(),
    }
}

/// Post-game statistics for the owner of an ended session.
pub async fn session_report(
    state: &SharedState,
    caller: Uuid,
    session_id: Uuid,
) -> Result<SessionReport, ServiceError> {
    let store = state.require_session_store().await?;
    let session = session_service::load_owned(store.as_ref(), caller, session_id).await?;
    if session.status != SessionStatus::Ended {
        return Err(ServiceError::InvalidState(
            "the report is available once the session has ended".into(),
        ));
    }

    let participants = store.list_participants(session_id).await?;
    let scores = store.list_scores(session_id).await?;
    let answers = store.list_answers(session_id).await?;
    let questions = store.list_questions(session.quiz_id).await?;
    let correct = ranking_service::correct_options(store.as_ref(), session.quiz_id).await?;

    Ok(SessionReport {
        session: (&session).into(),
        participants: participant_reports(&participants, &scores, &answers, &correct),
        questions: question_reports(&questions, &answers, &correct),
    })
}

fn mean(total: u64, count: u32) -> Option<u64> {
    (count > 0).then(|| total / u64::from(count))
}

fn participant_reports(
    participants: &[ParticipantEntity],
    scores: &[ScoreEntity],
    answers: &[AnswerEntity],
    correct: &HashSet<Uuid>,
) -> Vec<ParticipantReport> {
    participants
        .iter()
        .map(|participant| {
            let mine = answers
                .iter()
                .filter(|answer| answer.participant_id == participant.id);
            let (mut total, mut right, mut time, mut right_time) = (0u32, 0u32, 0u64, 0u64);
            for answer in mine {
                total += 1;
                time = time.saturating_add(answer.elapsed_ms);
                if correct.contains(&answer.option_id) {
                    right += 1;
                    right_time = right_time.saturating_add(answer.elapsed_ms);
                }
            }
            ParticipantReport {
                participant_id: participant.id,
                alias: participant.alias.clone(),
                score: scores
                    .iter()
                    .find(|score| score.participant_id == participant.id)
                    .map_or(0, |score| score.value),
                total_answers: total,
                correct_answers: right,
                total_time_ms: time,
                average_time_per_correct_ms: mean(right_time, right),
            }
        })
        .collect()
}

fn question_reports(
    questions: &[QuestionEntity],
    answers: &[AnswerEntity],
    correct: &HashSet<Uuid>,
) -> Vec<QuestionReport> {
    questions
        .iter()
        .map(|question| {
            let (mut total, mut right, mut time) = (0u32, 0u32, 0u64);
            for answer in answers
                .iter()
                .filter(|answer| answer.question_id == question.id)
            {
                total += 1;
                time = time.saturating_add(answer.elapsed_ms);
                if correct.contains(&answer.option_id) {
                    right += 1;
                }
            }
            let correct_percentage = if total == 0 {
                0.0
            } else {
                f64::from(right) * 100.0 / f64::from(total)
            };
            QuestionReport {
                question_id: question.id,
                text: question.text.clone(),
                order_index: question.order_index,
                total_answers: total,
                correct_answers: right,
                correct_percentage,
                average_time_ms: mean(time, total),
            }
        })
        .collect()
}
