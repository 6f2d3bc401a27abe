//! Calls the text-generation service and splits its answer into exercises.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::db::operations::ExercisePayload;
use crate::services::llm_provider::{LLMError, LLMProvider, ResponseFormat};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service error: {0}")]
    Llm(#[from] LLMError),
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
    #[error("generation returned no exercises")]
    Empty,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates a set of exercise payloads for the given instruction.
    async fn generate(&self, prompt: &str) -> Result<Vec<ExercisePayload>, GenerationError>;
}

pub struct LlmExerciseGenerator {
    llm: Arc<LLMProvider>,
}

impl LlmExerciseGenerator {
    pub fn new(llm: Arc<LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ContentGenerator for LlmExerciseGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<ExercisePayload>, GenerationError> {
        let content = self.llm.complete(prompt, ResponseFormat::JsonObject).await?;
        let exercises = parse_exercises(&content)?;
        tracing::info!(count = exercises.len(), model = self.llm.model(), "exercises generated");
        Ok(exercises)
    }
}

#[derive(Deserialize)]
struct GeneratedExercises {
    exercises: Vec<Box<RawValue>>,
}

/// Parses `{"exercises": [...]}`, keeping each element verbatim.
pub fn parse_exercises(content: &str) -> Result<Vec<ExercisePayload>, GenerationError> {
    let parsed: GeneratedExercises = serde_json::from_str(content.trim())
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    if parsed.exercises.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(parsed
        .exercises
        .into_iter()
        .map(ExercisePayload::from_raw)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_elements_verbatim() {
        let content = r#"{"exercises":[{"sentence":"Ich bleibe zu Hause, ___ es regnet.","answer":"weil"},{"b":[1,2]}]}"#;
        let exercises = parse_exercises(content).unwrap();
        assert_eq!(exercises.len(), 2);
        assert_eq!(
            exercises[0].as_str(),
            r#"{"sentence":"Ich bleibe zu Hause, ___ es regnet.","answer":"weil"}"#
        );
        assert_eq!(exercises[1].as_str(), r#"{"b":[1,2]}"#);
    }

    #[test]
    fn test_parse_empty_array_is_error() {
        assert!(matches!(parse_exercises(r#"{"exercises":[]}"#), Err(GenerationError::Empty)));
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        assert!(matches!(
            parse_exercises(r#"{"items":[{"a":1}]}"#),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_exercises("Here are your exercises!"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}
