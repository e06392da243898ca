use std::{collections::HashMap, time::SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{ParticipantEntity, ScoreEntity, SessionEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::participant::LeaderboardEntry,
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Join the lobby identified by `code` under `alias`.
///
/// Callers without an identity join as guests. Aliases are not unique; every join
/// creates a distinct participant with its own zeroed score row.
///
/// The join holds the session's transition gate, so it either completes before the
/// session starts or fails with `NotFound`. A join that cannot write both rows leaves
/// neither behind.
pub async fn join(
    state: &SharedState,
    code: &str,
    alias: &str,
    identity_id: Option<Uuid>,
) -> Result<(ParticipantEntity, SessionEntity), ServiceError> {
    let store = state.require_session_store().await?;
    let session = session_service::find_by_code(state, code).await?;
    ensure_lobby(&session, code)?;

    let session_id = session.id;
    let alias = alias.trim().to_owned();
    let store = store.as_ref();
    let (participant, session) = state
        .run_transition(session_id, || async move {
            let session = store
                .find_session(session_id)
                .await?
                .ok_or_else(|| closed_lobby(code))?;
            ensure_lobby(&session, code)?;

            let now = SystemTime::now();
            let participant = ParticipantEntity {
                id: Uuid::new_v4(),
                session_id,
                identity_id,
                alias,
                is_guest: identity_id.is_none(),
                joined_at: now,
            };
            store.insert_participant(participant.clone()).await?;
            if let Err(err) = store
                .insert_score(ScoreEntity::zero(session_id, participant.id, now))
                .await
            {
                undo_join(store, &participant).await;
                return Err(err.into());
            }

            // Another instance may have started the session meanwhile.
            let still_open = store
                .find_session(session_id)
                .await?
                .is_some_and(|current| current.status == SessionStatus::Lobby);
            if !still_open {
                undo_join(store, &participant).await;
                return Err(closed_lobby(code));
            }
            Ok::<_, ServiceError>((participant, session))
        })
        .await?;

    info!(
        session_id = %session.id,
        participant_id = %participant.id,
        alias = %participant.alias,
        guest = participant.is_guest,
        "participant joined"
    );
    Ok((participant, session))
}

fn closed_lobby(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("no session with code `{code}` is open for joining"))
}

fn ensure_lobby(session: &SessionEntity, code: &str) -> Result<(), ServiceError> {
    if session.status == SessionStatus::Lobby {
        Ok(())
    } else {
        Err(closed_lobby(code))
    }
}

async fn undo_join(store: &dyn SessionStore, participant: &ParticipantEntity) {
    if let Err(err) = store
        .remove_participant(participant.session_id, participant.id)
        .await
    {
        warn!(
            session_id = %participant.session_id,
            participant_id = %participant.id,
            error = %err,
            "could not undo an incomplete join"
        );
    }
}

/// Participants of a session in join order.
pub async fn list_participants(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<ParticipantEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    session_service::get_session(state, session_id).await?;
    Ok(store.list_participants(session_id).await?)
}

/// Current scores, best first and then by alias.
pub async fn leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let store = state.require_session_store().await?;
    session_service::get_session(state, session_id).await?;
    let participants = store.list_participants(session_id).await?;
    let scores = store.list_scores(session_id).await?;
    Ok(rank_live(&participants, &scores))
}

fn rank_live(participants: &[ParticipantEntity], scores: &[ScoreEntity]) -> Vec<LeaderboardEntry> {
    let by_participant: HashMap<Uuid, i64> = scores
        .iter()
        .map(|score| (score.participant_id, score.value))
        .collect();

    let mut entries: Vec<LeaderboardEntry> = participants
        .iter()
        .map(|participant| LeaderboardEntry {
            participant_id: participant.id,
            alias: participant.alias.clone(),
            is_guest: participant.is_guest,
            score: by_participant.get(&participant.id).copied().unwrap_or(0),
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.alias.cmp(&b.alias)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(alias: &str) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            identity_id: None,
            alias: alias.into(),
            is_guest: true,
            joined_at: SystemTime::now(),
        }
    }

    #[test]
    fn leaderboard_sorts_by_score_then_alias() {
        let zed = participant("Zed");
        let amy = participant("Amy");
        let bob = participant("Bob");
        let mut top = ScoreEntity::zero(Uuid::nil(), bob.id, SystemTime::now());
        top.value = 300;

        let entries = rank_live(&[zed.clone(), amy.clone(), bob.clone()], &[top]);
        let order: Vec<_> = entries.iter().map(|entry| entry.alias.as_str()).collect();
        assert_eq!(order, vec!["Bob", "Amy", "Zed"]);
        assert_eq!(entries[1].score, 0);
    }
}
