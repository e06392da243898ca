mod common;

use std::time::SystemTime;

use common::Fixture;
use quiz_live_back::{
    dao::{
        models::{AnswerEntity, SessionStatus},
        session_store::SessionStore,
    },
    dto::answer::SubmitAnswerRequest,
    error::ServiceError,
    services::{
        answer_service::{self, SubmitOutcome},
        participant_service, ranking_service, report_service, session_service,
    },
    state::session_machine::question_pointer_consistent,
};
use uuid::Uuid;

async fn submit(
    fixture: &Fixture,
    session_id: Uuid,
    participant_id: Uuid,
    question_id: Uuid,
    option_id: Uuid,
    elapsed_ms: u64,
) -> Result<SubmitOutcome, ServiceError> {
    answer_service::submit_answer(
        &fixture.state,
        session_id,
        SubmitAnswerRequest {
            participant_id,
            question_id,
            option_id,
            elapsed_ms,
        },
    )
    .await
}

#[tokio::test]
async fn scenario_a_full_session_produces_expected_ranking() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let alice = fixture.join(&session, "Alice").await;
    let bob = fixture.join(&session, "Bob").await;
    let (q1, q2) = (fixture.question_ids[0], fixture.question_ids[1]);
    let (q1_right, _) = fixture.options(q1).await;
    let (q2_right, q2_wrong) = fixture.options(q2).await;

    let running = session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(running.current_question_id, Some(q1));
    assert_eq!(running.time_limit_sec, 20);

    submit(&fixture, session.id, alice.id, q1, q1_right.id, 2_000).await.unwrap();
    submit(&fixture, session.id, bob.id, q1, q1_right.id, 1_500).await.unwrap();

    let second = session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(second.current_question_id, Some(q2));

    submit(&fixture, session.id, alice.id, q2, q2_right.id, 3_000).await.unwrap();
    let wrong = submit(&fixture, session.id, bob.id, q2, q2_wrong.id, 1_000)
        .await
        .unwrap();
    assert_eq!(
        wrong,
        SubmitOutcome::Recorded {
            correct: false,
            score: None
        }
    );

    // Advancing past the last question ends the session.
    let ended = session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert!(question_pointer_consistent(&ended));

    let results = ranking_service::results(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].alias, "Alice");
    assert_eq!(results[0].final_position, 1);
    assert_eq!(results[0].final_score, 200);
    assert_eq!(results[0].correct_answers, 2);
    assert_eq!(results[0].total_time_ms, 5_000);
    assert_eq!(results[1].alias, "Bob");
    assert_eq!(results[1].final_position, 2);
    assert_eq!(results[1].final_score, 100);
    assert_eq!(results[1].correct_answers, 1);
    assert_eq!(results[1].total_time_ms, 2_500);
}

#[tokio::test]
async fn scenario_b_tie_on_score_goes_to_the_faster_player() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let carol = fixture.join(&session, "Carol").await;
    let alice = fixture.join(&session, "Alice").await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    for (index, question_id) in fixture.question_ids.clone().into_iter().enumerate() {
        let (right, _) = fixture.options(question_id).await;
        let alice_ms = if index == 0 { 1_000 } else { 3_000 };
        submit(&fixture, session.id, carol.id, question_id, right.id, 3_000).await.unwrap();
        submit(&fixture, session.id, alice.id, question_id, right.id, alice_ms).await.unwrap();
        session_service::advance(&fixture.state, fixture.owner, session.id)
            .await
            .unwrap();
    }

    let results = ranking_service::results(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(results[0].alias, "Alice");
    assert_eq!(results[0].total_time_ms, 4_000);
    assert_eq!(results[1].alias, "Carol");
    assert_eq!(results[1].total_time_ms, 6_000);
    assert_eq!(results[0].final_score, results[1].final_score);
}

#[tokio::test]
async fn scenario_c_stale_answer_is_rejected_without_score_change() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let dan = fixture.join(&session, "Dan").await;
    let q1 = fixture.question_ids[0];
    let (q1_right, _) = fixture.options(q1).await;

    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let err = submit(&fixture, session.id, dan.id, q1, q1_right.id, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let board = participant_service::leaderboard(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(board[0].score, 0);
}

#[tokio::test]
async fn duplicate_submission_keeps_first_answer_and_awards_once() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let eve = fixture.join(&session, "Eve").await;
    let q1 = fixture.question_ids[0];
    let (right, wrong) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let first = submit(&fixture, session.id, eve.id, q1, right.id, 900).await.unwrap();
    assert_eq!(
        first,
        SubmitOutcome::Recorded {
            correct: true,
            score: Some(100)
        }
    );
    for option_id in [right.id, wrong.id] {
        let again = submit(&fixture, session.id, eve.id, q1, option_id, 100)
            .await
            .unwrap();
        assert_eq!(again, SubmitOutcome::AlreadyAnswered);
    }

    let stats = report_service::question_stats(&fixture.state, fixture.owner, session.id, q1)
        .await
        .unwrap();
    assert_eq!(stats.total_answers, 1);
    let picked: Vec<_> = stats
        .options
        .iter()
        .filter(|tally| tally.count > 0)
        .map(|tally| tally.option_id)
        .collect();
    assert_eq!(picked, vec![right.id]);

    let board = participant_service::leaderboard(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(board[0].score, 100);
}

#[tokio::test]
async fn concurrent_double_click_awards_once() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let fay = fixture.join(&session, "Fay").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let session_id = session.id;
    let attempts = (0..8).map(|_| {
        let state = fixture.state.clone();
        let request = SubmitAnswerRequest {
            participant_id: fay.id,
            question_id: q1,
            option_id: right.id,
            elapsed_ms: 700,
        };
        tokio::spawn(async move { answer_service::submit_answer(&state, session_id, request).await })
    });
    let outcomes = futures::future::join_all(attempts).await;
    let recorded = outcomes
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|outcome| matches!(outcome, SubmitOutcome::Recorded { .. }))
        .count();
    assert_eq!(recorded, 1);

    let board = participant_service::leaderboard(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(board[0].score, 100);
}

#[tokio::test]
async fn start_without_questions_is_rejected_and_stays_in_lobby() {
    let fixture = Fixture::with_questions(0, 20).await;
    let session = fixture.open_session().await;

    let err = session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let unchanged = session_service::get_session(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(unchanged.status, SessionStatus::Lobby);
    assert_eq!(unchanged.version, session.version);
}

#[tokio::test]
async fn only_the_owner_drives_the_session() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let stranger = Uuid::new_v4();

    let err = session_service::start(&fixture.state, stranger, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let err = session_service::create_session(&fixture.state, stranger, fixture.quiz_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));
}

#[tokio::test]
async fn end_twice_is_a_no_op_with_identical_results() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let gus = fixture.join(&session, "Gus").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    submit(&fixture, session.id, gus.id, q1, right.id, 1_200).await.unwrap();

    let ended = session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    let first = ranking_service::results(&fixture.state, session.id)
        .await
        .unwrap();

    let again = session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(again, ended);
    let late_advance = session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(late_advance, ended);

    let recomputed =
        session_service::recompute_results(&fixture.state, fixture.owner, session.id)
            .await
            .unwrap();
    assert_eq!(recomputed.len(), 1);
    assert_eq!(
        ranking_service::results(&fixture.state, session.id)
            .await
            .unwrap(),
        first
    );
    assert_eq!(fixture.state.transition_gate_count(), 0);
}

#[tokio::test]
async fn pause_freezes_answers_and_keeps_the_question() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let hal = fixture.join(&session, "Hal").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let paused = session_service::pause(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.current_question_id, Some(q1));

    let err = submit(&fixture, session.id, hal.id, q1, right.id, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let err = session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    session_service::resume(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert!(submit(&fixture, session.id, hal.id, q1, right.id, 100).await.is_ok());
}

#[tokio::test]
async fn joining_requires_an_open_lobby() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;

    let lower = session.code.to_lowercase();
    let (guest, _) = participant_service::join(&fixture.state, &lower, "Ivy", None)
        .await
        .unwrap();
    assert!(guest.is_guest);

    let identity = Uuid::new_v4();
    let (member, _) = participant_service::join(&fixture.state, &session.code, "Ivy", Some(identity))
        .await
        .unwrap();
    assert!(!member.is_guest);
    assert_ne!(guest.id, member.id);

    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    let err = participant_service::join(&fixture.state, &session.code, "Late", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = participant_service::join(&fixture.state, "ZZZZZZ", "Nobody", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn score_always_equals_points_times_correct_answers() {
    let fixture = Fixture::with_questions(3, 20).await;
    let session = fixture.open_session().await;
    let players = [
        fixture.join(&session, "Jo").await,
        fixture.join(&session, "Kim").await,
    ];
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    for (index, question_id) in fixture.question_ids.clone().into_iter().enumerate() {
        let (right, wrong) = fixture.options(question_id).await;
        for (slot, player) in players.iter().enumerate() {
            let option = if (index + slot) % 2 == 0 { &right } else { &wrong };
            submit(&fixture, session.id, player.id, question_id, option.id, 1_000)
                .await
                .unwrap();
            // Duplicate attempts never change the tally.
            submit(&fixture, session.id, player.id, question_id, right.id, 1_000)
                .await
                .unwrap();
        }
        session_service::advance(&fixture.state, fixture.owner, session.id)
            .await
            .unwrap();
    }

    let report = report_service::session_report(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    for participant in &report.participants {
        assert_eq!(participant.score, 100 * i64::from(participant.correct_answers));
        assert_eq!(participant.total_answers, 3);
    }
    assert_eq!(report.questions.len(), 3);
}

#[tokio::test]
async fn unavailable_store_surfaces_as_service_unavailable() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    fixture.store.set_online(false);

    let err = session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));

    fixture.store.set_online(true);
    let running = session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(running.status, SessionStatus::Running);
}

#[tokio::test]
async fn retried_answer_repairs_a_missing_award() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let ida = fixture.join(&session, "Ida").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    // The answer row landed but the award never did.
    fixture
        .store
        .insert_answer(AnswerEntity {
            session_id: session.id,
            question_id: q1,
            participant_id: ida.id,
            option_id: right.id,
            elapsed_ms: 1_500,
            created_at: SystemTime::now(),
        })
        .await
        .unwrap();
    let board = participant_service::leaderboard(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(board[0].score, 0);

    for _ in 0..2 {
        let retry = submit(&fixture, session.id, ida.id, q1, right.id, 1_500)
            .await
            .unwrap();
        assert_eq!(retry, SubmitOutcome::AlreadyAnswered);
        let board = participant_service::leaderboard(&fixture.state, session.id)
            .await
            .unwrap();
        assert_eq!(board[0].score, 100);
    }

    session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    let results = ranking_service::results(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(results[0].final_score, 100);
    assert_eq!(results[0].correct_answers, 1);
}

#[tokio::test]
async fn reported_answer_time_is_bounded() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let jon = fixture.join(&session, "Jon").await;
    let q1 = fixture.question_ids[0];
    let (right, _) = fixture.options(q1).await;
    session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let err = submit(&fixture, session.id, jon.id, q1, right.id, u64::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // Longer than the 20 s countdown: stored as the full countdown.
    let outcome = submit(&fixture, session.id, jon.id, q1, right.id, 500_000)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Recorded { correct: true, .. }));

    session_service::end(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    let results = ranking_service::results(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(results[0].total_time_ms, 20_000);
    let report = report_service::session_report(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();
    assert_eq!(report.participants[0].total_time_ms, 20_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_racing_the_start_never_land_in_a_running_session() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;

    let joins: Vec<_> = (0..24)
        .map(|index| {
            let state = fixture.state.clone();
            let code = session.code.clone();
            tokio::spawn(async move {
                participant_service::join(&state, &code, &format!("Player {index}"), None).await
            })
        })
        .collect();
    let start = {
        let state = fixture.state.clone();
        let (owner, session_id) = (fixture.owner, session.id);
        tokio::spawn(async move { session_service::start(&state, owner, session_id).await })
    };

    let started = start.await.unwrap().unwrap();
    let started_at = started.started_at.unwrap();
    let mut joined = Vec::new();
    for outcome in futures::future::join_all(joins).await {
        match outcome.unwrap() {
            Ok((participant, lobby)) => {
                assert_eq!(lobby.status, SessionStatus::Lobby);
                assert!(participant.joined_at <= started_at);
                joined.push(participant.id);
            }
            Err(err) => assert!(matches!(err, ServiceError::NotFound(_))),
        }
    }

    let listed = participant_service::list_participants(&fixture.state, session.id)
        .await
        .unwrap();
    let mut listed: Vec<_> = listed.iter().map(|participant| participant.id).collect();
    listed.sort();
    joined.sort();
    assert_eq!(listed, joined);
    let scores = fixture.store.list_scores(session.id).await.unwrap();
    assert_eq!(scores.len(), joined.len());
    assert_eq!(fixture.state.transition_gate_count(), 0);
}

#[tokio::test]
async fn advance_fails_when_the_question_in_play_is_gone() {
    let fixture = Fixture::with_questions(2, 20).await;
    let session = fixture.open_session().await;
    let running = session_service::start(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap();

    let mut dangling = running.clone();
    dangling.current_question_id = Some(Uuid::new_v4());
    dangling.version += 1;
    assert!(
        fixture
            .store
            .update_session(dangling.clone(), running.version)
            .await
            .unwrap()
    );

    let err = session_service::advance(&fixture.state, fixture.owner, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let after = session_service::get_session(&fixture.state, session.id)
        .await
        .unwrap();
    assert_eq!(after, dangling);
    assert_eq!(after.status, SessionStatus::Running);
}
