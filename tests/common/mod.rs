#![allow(dead_code)]

use std::sync::Arc;

use quiz_live_back::{
    config::AppConfig,
    dao::{
        models::{OptionEntity, ParticipantEntity, SessionEntity},
        session_store::MemorySessionStore,
    },
    dto::quiz::{OptionInput, QuestionInput, QuizImportRequest},
    services::{participant_service, quiz_service, session_service},
    state::{AppState, SharedState},
};
use uuid::Uuid;

pub struct Fixture {
    pub state: SharedState,
    pub store: MemorySessionStore,
    pub owner: Uuid,
    pub quiz_id: Uuid,
    pub question_ids: Vec<Uuid>,
}

impl Fixture {
    /// A quiz of `questions` two-option questions, the first option being correct.
    pub async fn with_questions(questions: usize, time_limit_sec: u32) -> Self {
        Self::with_config(AppConfig::default(), questions, time_limit_sec).await
    }

    pub async fn with_config(config: AppConfig, questions: usize, time_limit_sec: u32) -> Self {
        let store = MemorySessionStore::new();
        let state = AppState::with_store(config, Arc::new(store.clone())).await;
        let owner = Uuid::new_v4();
        let request = QuizImportRequest {
            title: "General knowledge".into(),
            questions: (0..questions)
                .map(|index| QuestionInput {
                    text: format!("Question {}", index + 1),
                    order_index: index as i32,
                    time_limit_sec,
                    options: vec![
                        OptionInput {
                            text: "right".into(),
                            is_correct: true,
                        },
                        OptionInput {
                            text: "wrong".into(),
                            is_correct: false,
                        },
                    ],
                })
                .collect(),
        };
        let imported = quiz_service::import_quiz(&state, owner, request)
            .await
            .expect("quiz import");
        Self {
            state,
            store,
            owner,
            quiz_id: imported.quiz_id,
            question_ids: imported.question_ids,
        }
    }

    pub async fn open_session(&self) -> SessionEntity {
        session_service::create_session(&self.state, self.owner, self.quiz_id)
            .await
            .expect("create session")
    }

    pub async fn join(&self, session: &SessionEntity, alias: &str) -> ParticipantEntity {
        participant_service::join(&self.state, &session.code, alias, None)
            .await
            .expect("join")
            .0
    }

    /// (correct, wrong) options of a question.
    pub async fn options(&self, question_id: Uuid) -> (OptionEntity, OptionEntity) {
        let (_, options) = quiz_service::load_question(&self.state, question_id)
            .await
            .expect("load question");
        let correct = options
            .iter()
            .find(|option| option.is_correct)
            .cloned()
            .expect("correct option");
        let wrong = options
            .iter()
            .find(|option| !option.is_correct)
            .cloned()
            .expect("wrong option");
        (correct, wrong)
    }
}
