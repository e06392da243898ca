//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::quiz::QuestionInput;

/// Length of a session join code.
pub const JOIN_CODE_LEN: usize = 6;
/// Longest accepted display alias, in characters.
pub const MAX_ALIAS_CHARS: usize = 32;
/// Longest accepted question countdown.
pub const MAX_TIME_LIMIT_SEC: u32 = 600;

/// Validates that a join code is exactly 6 ASCII alphanumeric characters, in any case.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("AB12CD") // Ok
/// validate_join_code("ab12cd") // Ok - codes are case-insensitive
/// validate_join_code("AB12C")  // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LEN {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a display alias: non-blank once trimmed, at most [`MAX_ALIAS_CHARS`], no control characters.
pub fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    let trimmed = alias.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("alias_empty");
        err.message = Some("Alias must not be blank".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_ALIAS_CHARS {
        let mut err = ValidationError::new("alias_length");
        err.message = Some(format!("Alias must be at most {MAX_ALIAS_CHARS} characters").into());
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("alias_format");
        err.message = Some("Alias must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates one imported question and its options.
pub fn validate_question(question: &QuestionInput) -> Result<(), ValidationError> {
    if question.text.trim().is_empty() {
        let mut err = ValidationError::new("question_text_empty");
        err.message = Some("Question text must not be empty".into());
        return Err(err);
    }

    if !(1..=MAX_TIME_LIMIT_SEC).contains(&question.time_limit_sec) {
        let mut err = ValidationError::new("question_time_limit");
        err.message = Some(
            format!(
                "Time limit must be between 1 and {MAX_TIME_LIMIT_SEC} seconds (got {})",
                question.time_limit_sec
            )
            .into(),
        );
        return Err(err);
    }

    if question.options.len() < 2 {
        let mut err = ValidationError::new("question_options_count");
        err.message = Some("A question needs at least two options".into());
        return Err(err);
    }

    if !question.options.iter().any(|option| option.is_correct) {
        let mut err = ValidationError::new("question_no_correct_option");
        err.message = Some("A question needs at least one correct option".into());
        return Err(err);
    }

    Ok(())
}
