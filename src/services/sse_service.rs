use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream::BoxStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::{ChangeFilter, RowChange, Table},
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Tables pushed to HTTP subscribers. Answers stay server-side.
const PUSHED_TABLES: [Table; 4] = [Table::Session, Table::Participant, Table::Score, Table::Result];

/// Open the store change feed for one session.
pub async fn subscribe_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(BoxStream<'static, RowChange>, ServerEvent), ServiceError> {
    session_service::get_session(state, session_id).await?;
    let store = state.require_session_store().await?;
    let feed = store
        .subscribe(ChangeFilter::session(session_id).only(&PUSHED_TABLES))
        .await?;

    let handshake = ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            session_id,
            message: "subscribed to session updates".into(),
            degraded: state.is_degraded().await,
        },
    )
    .map_err(|err| ServiceError::Validation(format!("unable to encode handshake: {err}")))?;

    Ok((feed, handshake))
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Forward a session change feed to an SSE response, preceded by `handshake`.
///
/// The response ends when the feed does; HTTP clients reconnect and fall back to polling.
pub fn to_sse_stream(
    session_id: Uuid,
    mut feed: BoxStream<'static, RowChange>,
    handshake: ServerEvent,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if tx.send(Ok(to_event(handshake))).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = feed.next() => {
                    let Some(change) = next else {
                        debug!(%session_id, "session change feed ended");
                        break;
                    };
                    match ServerEvent::from_change(&change) {
                        Some(Ok(payload)) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => warn!(%session_id, error = %err, "unable to encode change event"),
                        None => {}
                    }
                }
            }
        }
        info!(%session_id, "session SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{AnswerEntity, ScoreEntity, SessionEntity},
            session_store::{ChangeKind, ChangeRow, MemorySessionStore, SessionStore},
        },
        state::AppState,
    };

    #[tokio::test]
    async fn answers_never_reach_subscribers() {
        let store = MemorySessionStore::new();
        let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone())).await;
        let now = SystemTime::now();
        let session = SessionEntity::lobby(Uuid::new_v4(), Uuid::new_v4(), "SSE123".into(), now);
        store.insert_session(session.clone()).await.unwrap();
        let (participant_id, question_id) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .insert_score(ScoreEntity::zero(session.id, participant_id, now))
            .await
            .unwrap();

        let (mut feed, handshake) = subscribe_session(&state, session.id).await.unwrap();
        assert_eq!(handshake.event.as_deref(), Some("handshake"));

        let answer = AnswerEntity {
            session_id: session.id,
            question_id,
            participant_id,
            option_id: Uuid::new_v4(),
            elapsed_ms: 2_000,
            created_at: now,
        };
        store.insert_answer(answer.clone()).await.unwrap();
        store
            .award_points(session.id, participant_id, question_id, 100)
            .await
            .unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert!(matches!(change.row, ChangeRow::Score(ref score) if score.value == 100));

        let leaked = RowChange {
            kind: ChangeKind::Insert,
            row: ChangeRow::Answer(answer),
        };
        assert!(ServerEvent::from_change(&leaked).is_none());
    }
}
