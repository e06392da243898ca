mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use common::Fixture;
use quiz_live_back::{
    config::AppConfig,
    dao::session_store::MemorySessionStore,
    routes::{self, identity::IDENTITY_HEADER},
    state::AppState,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, identity: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
    if let Some(identity) = identity {
        builder = builder.header(IDENTITY_HEADER, identity.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn healthcheck_reports_degraded_without_store() {
    let app = routes::router(AppState::new(AppConfig::default()));
    let (status, body) = send(&app, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    let fixture = Fixture::with_questions(1, 20).await;
    let app = routes::router(fixture.state.clone());
    let (status, body) = send(&app, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn controller_endpoints_require_an_identity() {
    let fixture = Fixture::with_questions(1, 20).await;
    let app = routes::router(fixture.state.clone());

    let (status, body) = send(
        &app,
        post_json("/sessions", None, json!({ "quiz_id": fixture.quiz_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains(IDENTITY_HEADER));

    let request = Request::post("/sessions")
        .header(CONTENT_TYPE, "application/json")
        .header(IDENTITY_HEADER, "not-a-uuid")
        .body(Body::from(json!({ "quiz_id": fixture.quiz_id }).to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json(
            "/sessions",
            Some(Uuid::new_v4()),
            json!({ "quiz_id": fixture.quiz_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn import_open_join_and_play_over_http() {
    let state = AppState::with_store(AppConfig::default(), Arc::new(MemorySessionStore::new())).await;
    let app = routes::router(state);
    let owner = Uuid::new_v4();

    let (status, quiz) = send(
        &app,
        post_json(
            "/quizzes",
            Some(owner),
            json!({
                "title": "Capitals",
                "questions": [{
                    "text": "Capital of France?",
                    "order_index": 0,
                    "time_limit_sec": 20,
                    "options": [
                        { "text": "Paris", "is_correct": true },
                        { "text": "Lyon" }
                    ]
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let quiz_id = quiz["quiz_id"].as_str().unwrap().to_owned();

    let (status, session) = send(
        &app,
        post_json("/sessions", Some(owner), json!({ "quiz_id": quiz_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["status"], "lobby");
    let session_id = session["id"].as_str().unwrap().to_owned();
    let code = session["code"].as_str().unwrap().to_lowercase();

    let (status, joined) = send(
        &app,
        post_json("/sessions/join", None, json!({ "code": code, "alias": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(joined["participant"]["is_guest"], true);
    let participant_id = joined["participant"]["id"].as_str().unwrap().to_owned();

    let (status, running) = send(
        &app,
        post_json(&format!("/sessions/{session_id}/start"), Some(owner), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(running["status"], "running");

    let (status, question) = send(&app, get(&format!("/sessions/{session_id}/question"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(question["text"], "Capital of France?");
    assert!(question["options"][0].get("is_correct").is_none());
    let question_id = question["question_id"].as_str().unwrap().to_owned();
    let paris = question["options"]
        .as_array()
        .unwrap()
        .iter()
        .find(|option| option["text"] == "Paris")
        .unwrap()["option_id"]
        .clone();

    let answer = json!({
        "participant_id": participant_id,
        "question_id": question_id,
        "option_id": paris,
        "elapsed_ms": 1_200
    });
    let uri = format!("/sessions/{session_id}/answers");
    let (status, recorded) = send(&app, post_json(&uri, None, answer.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recorded["status"], "recorded");
    assert_eq!(recorded["score"], 100);
    let (status, repeated) = send(&app, post_json(&uri, None, answer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repeated["status"], "already_answered");

    let (status, ended) = send(
        &app,
        post_json(&format!("/sessions/{session_id}/advance"), Some(owner), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["status"], "ended");
    assert_eq!(ended["current_question_id"], Value::Null);

    let (status, results) = send(&app, get(&format!("/sessions/{session_id}/results"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["alias"], "Alice");
    assert_eq!(results[0]["final_position"], 1);
    assert_eq!(results[0]["final_score"], 100);
}

#[tokio::test]
async fn invalid_payloads_are_rejected_before_any_write() {
    let fixture = Fixture::with_questions(1, 20).await;
    let session = fixture.open_session().await;
    let app = routes::router(fixture.state.clone());

    let (status, body) = send(
        &app,
        post_json("/sessions/join", None, json!({ "code": "AB-2CD", "alias": "Bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("code"));

    let (status, body) = send(
        &app,
        post_json(
            "/sessions/join",
            None,
            json!({ "code": session.code, "alias": "   " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("alias"));

    let (status, body) = send(
        &app,
        post_json(
            &format!("/sessions/{}/answers", session.id),
            None,
            json!({
                "participant_id": Uuid::new_v4(),
                "question_id": fixture.question_ids[0],
                "option_id": Uuid::new_v4(),
                "elapsed_ms": 900_000
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        post_json(
            "/quizzes",
            Some(fixture.owner),
            json!({
                "title": "Broken",
                "questions": [{
                    "text": "No correct option",
                    "order_index": 0,
                    "time_limit_sec": 20,
                    "options": [{ "text": "a" }, { "text": "b" }]
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, board) = send(
        &app,
        get(&format!("/sessions/{}/participants", session.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board, json!([]));
}

#[tokio::test]
async fn unknown_codes_and_sessions_are_not_found() {
    let fixture = Fixture::with_questions(1, 20).await;
    let app = routes::router(fixture.state.clone());

    let (status, _) = send(&app, get("/sessions/code/ZZZZZZ")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get(&format!("/sessions/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().starts_with("not found"));
}

#[tokio::test]
async fn controllers_list_only_their_own_sessions() {
    let fixture = Fixture::with_questions(1, 20).await;
    let first = fixture.open_session().await;
    let second = fixture.open_session().await;
    let app = routes::router(fixture.state.clone());

    let (status, _) = send(&app, get("/sessions")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mine = Request::get("/sessions")
        .header(IDENTITY_HEADER, fixture.owner.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, mine).await;
    assert_eq!(status, StatusCode::OK);
    let mut listed: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|session| session["id"].as_str().unwrap().to_owned())
        .collect();
    listed.sort();
    let mut expected = vec![first.id.to_string(), second.id.to_string()];
    expected.sort();
    assert_eq!(listed, expected);

    let stranger = Request::get("/sessions")
        .header(IDENTITY_HEADER, Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, stranger).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
