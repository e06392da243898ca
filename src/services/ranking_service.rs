use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashSet},
};

use indexmap::IndexMap;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            AnswerEntity, ParticipantEntity, ScoreEntity, SessionEntity, SessionResultEntity,
            SessionStatus,
        },
        session_store::SessionStore,
    },
    dto::results::ResultRow,
    error::ServiceError,
    state::SharedState,
};

#[derive(Debug, Default, Clone)]
struct Tally {
    has_rows: bool,
    score: i64,
    total_answers: u32,
    correct_answers: u32,
    total_time_ms: u64,
}

/// Aggregate answers and scores into final ranking rows.
///
/// Participants are ranked by score descending, then by total answer time ascending.
/// Remaining ties keep join order, so the same inputs always give the same positions.
/// Only participants with at least one answer or score row are ranked.
pub fn compute_rankings(
    session_id: Uuid,
    participants: &[ParticipantEntity],
    scores: &[ScoreEntity],
    answers: &[AnswerEntity],
    correct_options: &HashSet<Uuid>,
) -> Vec<SessionResultEntity> {
    let mut tallies: IndexMap<Uuid, Tally> = participants
        .iter()
        .map(|participant| (participant.id, Tally::default()))
        .collect();

    // Rows whose participant is missing from the roster rank after it, ordered by id.
    let strays: BTreeSet<Uuid> = scores
        .iter()
        .map(|score| score.participant_id)
        .chain(answers.iter().map(|answer| answer.participant_id))
        .filter(|id| !tallies.contains_key(id))
        .collect();
    tallies.extend(strays.into_iter().map(|id| (id, Tally::default())));

    for score in scores.iter().filter(|score| score.session_id == session_id) {
        if let Some(tally) = tallies.get_mut(&score.participant_id) {
            tally.has_rows = true;
            tally.score = score.value;
        }
    }

    for answer in answers.iter().filter(|answer| answer.session_id == session_id) {
        if let Some(tally) = tallies.get_mut(&answer.participant_id) {
            tally.has_rows = true;
            tally.total_answers += 1;
            tally.total_time_ms = tally.total_time_ms.saturating_add(answer.elapsed_ms);
            if correct_options.contains(&answer.option_id) {
                tally.correct_answers += 1;
            }
        }
    }

    let mut ranked: Vec<(Uuid, Tally)> = tallies
        .into_iter()
        .filter(|(_, tally)| tally.has_rows)
        .collect();
    ranked.sort_by_key(|(_, tally)| (Reverse(tally.score), tally.total_time_ms));

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (participant_id, tally))| SessionResultEntity {
            session_id,
            participant_id,
            final_position: index as u32 + 1,
            final_score: tally.score,
            total_answers: tally.total_answers,
            correct_answers: tally.correct_answers,
            total_time_ms: tally.total_time_ms,
        })
        .collect()
}

/// Option ids flagged correct across every question of a quiz.
pub(crate) async fn correct_options(
    store: &dyn SessionStore,
    quiz_id: Uuid,
) -> Result<HashSet<Uuid>, ServiceError> {
    let mut correct = HashSet::new();
    for question in store.list_questions(quiz_id).await? {
        correct.extend(
            store
                .list_options(question.id)
                .await?
                .into_iter()
                .filter(|option| option.is_correct)
                .map(|option| option.id),
        );
    }
    Ok(correct)
}

/// Gather the inputs of a session, compute the ranking and upsert it.
pub(crate) async fn finalize(
    store: &dyn SessionStore,
    session: &SessionEntity,
) -> Result<Vec<SessionResultEntity>, ServiceError> {
    let participants = store.list_participants(session.id).await?;
    let scores = store.list_scores(session.id).await?;
    let answers = store.list_answers(session.id).await?;
    let correct = correct_options(store, session.quiz_id).await?;

    let results = compute_rankings(session.id, &participants, &scores, &answers, &correct);
    store.upsert_results(results.clone()).await?;
    info!(
        session_id = %session.id,
        ranked = results.len(),
        "session results persisted"
    );
    Ok(results)
}

/// Final ranking of an ended session, joined with participant aliases.
///
/// Empty until the ranking has been persisted.
pub async fn results(state: &SharedState, session_id: Uuid) -> Result<Vec<ResultRow>, ServiceError> {
    let store = state.require_session_store().await?;
    let session = store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    if session.status != SessionStatus::Ended {
        return Ok(Vec::new());
    }

    let aliases: IndexMap<Uuid, String> = store
        .list_participants(session_id)
        .await?
        .into_iter()
        .map(|participant| (participant.id, participant.alias))
        .collect();

    Ok(store
        .list_results(session_id)
        .await?
        .into_iter()
        .map(|result| {
            let alias = aliases
                .get(&result.participant_id)
                .cloned()
                .unwrap_or_default();
            ResultRow::new(result, alias)
        })
        .collect())
}
