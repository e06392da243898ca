use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::validation::validate_question;

/// Bulk import of a quiz with its questions and options.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuizImportRequest {
    /// Non-blank title.
    pub title: String,
    /// Questions; `order_index` must be unique.
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
}

/// Incoming question definition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuestionInput {
    /// Prompt text.
    pub text: String,
    /// Play position within the quiz.
    pub order_index: i32,
    /// Countdown in seconds, zero for none.
    pub time_limit_sec: u32,
    /// At least two options, one of them correct.
    pub options: Vec<OptionInput>,
}

/// Incoming option definition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OptionInput {
    /// Option label.
    pub text: String,
    /// Defaults to false.
    #[serde(default)]
    pub is_correct: bool,
}

impl Validate for QuizImportRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.title.trim().is_empty() {
            let mut err = ValidationError::new("title_empty");
            err.message = Some("Quiz title must not be empty".into());
            errors.add("title", err);
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if let Err(err) = validate_question(question) {
                errors.add("questions", err);
            }
            if !seen.insert(question.order_index) {
                let mut err = ValidationError::new("order_index_duplicate");
                err.message = Some(
                    format!("Order index {} is used more than once", question.order_index).into(),
                );
                errors.add("questions", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Identifiers assigned to an imported quiz, questions listed in play order.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizImportResponse {
    /// New quiz identifier.
    pub quiz_id: Uuid,
    /// New question identifiers.
    pub question_ids: Vec<Uuid>,
}
