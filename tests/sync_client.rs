mod common;

use std::time::Duration;

use common::Fixture;
use quiz_live_back::{
    client::{Capability, ClientError, ClientEvent, ClientRole, SessionClient},
    dao::models::SessionStatus,
    error::ServiceError,
    services::{answer_service::SubmitOutcome, session_service},
};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

async fn next_event(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("event within a minute")
        .expect("client still running")
}

async fn controller(fixture: &Fixture, session_id: Uuid) -> (SessionClient, UnboundedReceiver<ClientEvent>) {
    SessionClient::connect(
        fixture.state.clone(),
        session_id,
        ClientRole::Controller {
            owner_id: fixture.owner,
        },
    )
    .await
    .unwrap()
}

async fn participant(
    fixture: &Fixture,
    session_id: Uuid,
    participant_id: Uuid,
) -> (SessionClient, UnboundedReceiver<ClientEvent>) {
    SessionClient::connect(
        fixture.state.clone(),
        session_id,
        ClientRole::Participant { participant_id },
    )
    .await
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn participants_follow_the_controller_through_a_question() {
    let fixture = Fixture::with_questions(2, 10).await;
    let session = fixture.open_session().await;
    let alice = fixture.join(&session, "Alice").await;
    let bob = fixture.join(&session, "Bob").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;

    let (host, _host_events) = controller(&fixture, session.id).await;
    let (alice_client, mut alice_events) = participant(&fixture, session.id, alice.id).await;
    let (bob_client, mut bob_events) = participant(&fixture, session.id, bob.id).await;

    host.start().await.unwrap();
    let started = ClientEvent::QuestionStarted {
        question_id: q1,
        time_limit_sec: 10,
    };
    assert_eq!(next_event(&mut alice_events).await, started);
    assert_eq!(next_event(&mut bob_events).await, started);

    let outcome = alice_client.answer(right.id).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Recorded {
            correct: true,
            score: Some(100)
        }
    );
    assert_eq!(alice_client.view().answer, Some(right.id));
    assert_eq!(
        alice_client.answer(right.id).await.unwrap(),
        SubmitOutcome::AlreadyAnswered
    );

    // Bob lets the countdown run out and gets the reveal.
    assert_eq!(
        next_event(&mut bob_events).await,
        ClientEvent::AnswerWindowClosed {
            question_id: q1,
            correct_option: Some(right.id),
        }
    );
    assert_eq!(bob_client.view().revealed, Some(right.id));
    let late = bob_client.answer(right.id).await.unwrap_err();
    assert!(matches!(late, ClientError::WindowClosed));

    let mut host_view = host.watch();
    tokio::time::timeout(
        Duration::from_secs(30),
        host_view.wait_for(|view| view.score_of(alice.id) == Some(100)),
    )
    .await
    .expect("controller sees the score")
    .unwrap();
    assert_eq!(host.view().score_of(bob.id), Some(0));

    alice_client.shutdown().await;
    bob_client.shutdown().await;
    host.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn polling_converges_without_push() {
    let fixture = Fixture::with_questions(2, 30).await;
    let session = fixture.open_session().await;
    let dan = fixture.join(&session, "Dan").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;

    let (client, mut events) = participant(&fixture, session.id, dan.id).await;
    fixture.store.set_push_muted(true);
    fixture.store.disconnect_feeds();

    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::QuestionStarted {
            question_id: q1,
            time_limit_sec: 30,
        }
    );

    client.answer(right.id).await.unwrap();
    let mut view = client.watch();
    tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|view| view.score_of(dan.id) == Some(100)),
    )
    .await
    .expect("score picked up by polling")
    .unwrap();

    // Participants of other sessions never leak into the view.
    let other = fixture.open_session().await;
    let stranger = fixture.join(&other, "Elsewhere").await;
    assert!(!client.view().participants.contains_key(&stranger.id));

    session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::SessionEnded);
    match next_event(&mut events).await {
        ClientEvent::ResultsReady { results, timed_out } => {
            assert!(!timed_out);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].participant_id, dan.id);
            assert_eq!(results[0].final_score, 100);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.view().status(), Some(SessionStatus::Ended));
    assert_eq!(client.view().current_question_id(), None);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_the_answer_window() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let fay = fixture.join(&session, "Fay").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;

    let (host, _host_events) = controller(&fixture, session.id).await;
    let (client, mut events) = participant(&fixture, session.id, fay.id).await;

    host.start().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::QuestionStarted { .. }
    ));

    let paused = host.pause().await.unwrap();
    assert_eq!(paused.current_question_id, Some(q1));
    assert_eq!(next_event(&mut events).await, ClientEvent::Paused);
    let frozen = client.answer(right.id).await.unwrap_err();
    assert!(matches!(frozen, ClientError::WindowClosed));

    // Time spent paused does not count against the countdown.
    tokio::time::sleep(Duration::from_secs(60)).await;
    host.resume().await.unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::Resumed);
    assert!(matches!(
        client.answer(right.id).await.unwrap(),
        SubmitOutcome::Recorded { correct: true, .. }
    ));

    host.shutdown().await;
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn answer_to_a_question_that_moved_on_is_closed() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let gus = fixture.join(&session, "Gus").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;

    let (client, mut events) = participant(&fixture, session.id, gus.id).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    next_event(&mut events).await;

    // The controller advances while the client still shows the first question.
    fixture.store.set_push_muted(true);
    fixture.store.disconnect_feeds();
    session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(client.view().current_question_id(), Some(q1));

    let err = client.answer(right.id).await.unwrap_err();
    assert!(matches!(err, ClientError::QuestionClosed));
    assert_eq!(client.view().current_question_id(), Some(fixture.question_ids[1]));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn results_gate_gives_up_when_ranking_never_shows() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let hal = fixture.join(&session, "Hal").await;

    let (client, mut events) = participant(&fixture, session.id, hal.id).await;
    session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    fixture.store.set_online(false);

    assert_eq!(next_event(&mut events).await, ClientEvent::SessionEnded);
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ResultsReady {
            results: Vec::new(),
            timed_out: true,
        }
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn roles_limit_what_a_client_may_do() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let ivy = fixture.join(&session, "Ivy").await;
    let (right, _) = fixture.options(fixture.question_ids[0]).await;

    let (host, _host_events) = controller(&fixture, session.id).await;
    let (client, _events) = participant(&fixture, session.id, ivy.id).await;

    let err = client.start().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::NotPermitted(Capability::DriveSession)
    ));
    let err = host.answer(right.id).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::NotPermitted(Capability::SubmitAnswer)
    ));
    let err = client.answer(right.id).await.unwrap_err();
    assert!(matches!(err, ClientError::NoActiveQuestion));

    let other = fixture.open_session().await;
    let err = SessionClient::connect(
        fixture.state.clone(),
        other.id,
        ClientRole::Participant {
            participant_id: ivy.id,
        },
    )
    .await
    .err()
    .expect("participant of another session");
    assert!(matches!(err, ClientError::Service(ServiceError::NotFound(_))));

    host.shutdown().await;
    client.shutdown().await;
}
