use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{OptionEntity, QuestionEntity, QuizEntity},
    dto::quiz::{QuizImportRequest, QuizImportResponse},
    error::ServiceError,
    state::SharedState,
};

/// Validate and persist a quiz with all its questions and options.
///
/// Validation runs before the first write, so a malformed import stores nothing.
pub async fn import_quiz(
    state: &SharedState,
    owner_id: Uuid,
    request: QuizImportRequest,
) -> Result<QuizImportResponse, ServiceError> {
    request.validate()?;
    let store = state.require_session_store().await?;

    let quiz = QuizEntity {
        id: Uuid::new_v4(),
        title: request.title.trim().to_owned(),
        owner_id,
        created_at: SystemTime::now(),
    };

    let mut questions = request.questions;
    questions.sort_by_key(|question| question.order_index);

    let mut question_ids = Vec::with_capacity(questions.len());
    for input in questions {
        let question = QuestionEntity {
            id: Uuid::new_v4(),
            quiz_id: quiz.id,
            text: input.text.trim().to_owned(),
            order_index: input.order_index,
            time_limit_sec: input.time_limit_sec,
        };
        for option in input.options {
            store
                .save_option(OptionEntity {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    text: option.text.trim().to_owned(),
                    is_correct: option.is_correct,
                })
                .await?;
        }
        question_ids.push(question.id);
        store.save_question(question).await?;
    }
    // Saved last so the quiz only becomes visible once complete.
    store.save_quiz(quiz.clone()).await?;

    info!(
        quiz_id = %quiz.id,
        %owner_id,
        questions = question_ids.len(),
        "quiz imported"
    );
    Ok(QuizImportResponse {
        quiz_id: quiz.id,
        question_ids,
    })
}

/// A question with its options.
pub async fn load_question(
    state: &SharedState,
    question_id: Uuid,
) -> Result<(QuestionEntity, Vec<OptionEntity>), ServiceError> {
    let store = state.require_session_store().await?;
    let question = store
        .find_question(question_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))?;
    let options = store.list_options(question_id).await?;
    Ok((question, options))
}
