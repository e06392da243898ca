use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{OptionEntity, QuestionEntity};

/// Question in play as shown to participants, without correctness flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerQuestion {
    /// Question identifier.
    pub question_id: Uuid,
    /// Prompt text.
    pub text: String,
    /// Play position.
    pub order_index: i32,
    /// Effective countdown in seconds; zero means none.
    pub time_limit_sec: u32,
    /// Options in stored order.
    pub options: Vec<PlayerOption>,
}

/// Answer option without its correctness flag.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerOption {
    /// Option identifier to submit.
    pub option_id: Uuid,
    /// Option label.
    pub text: String,
}

impl PlayerQuestion {
    /// Build the player view of a question, dropping correctness flags.
    pub fn new(question: &QuestionEntity, options: &[OptionEntity], time_limit_sec: u32) -> Self {
        Self {
            question_id: question.id,
            text: question.text.clone(),
            order_index: question.order_index,
            time_limit_sec,
            options: options
                .iter()
                .map(|option| PlayerOption {
                    option_id: option.id,
                    text: option.text.clone(),
                })
                .collect(),
        }
    }
}
