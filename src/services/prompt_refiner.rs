//! Rewrites a topic prompt into a more varied generation instruction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::services::llm_provider::{LLMError, LLMProvider, ResponseFormat};

const META_PROMPT: &str = r#"You are a prompt engineering assistant. Your task is to refine the following user-provided prompt to improve the variety and creativity of the AI's output for generating language exercises.

**Refinement Rules:**
1.  **Do Not Change the JSON Schema:** The core instructions for the JSON output format and the schema definition must remain untouched. The refined prompt must still produce a valid JSON object.
2.  **Enhance Instructions:** Rephrase the instructions to encourage more diverse and less repetitive sentences. Add suggestions for using a wider range of vocabulary or sentence structures.
3.  **Add Examples:** Include one or two new, concrete examples of the desired output format within the prompt. This helps the model better understand the task.
4.  **Maintain Core Task:** The fundamental goal of the prompt (e.g., creating German conjunction exercises) must be preserved.
5.  **Output:** Your final output should be ONLY the refined prompt, with no extra text, explanations, or markdown formatting around it.

Here is the prompt to refine:
---
{prompt}
---
"#;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error(transparent)]
    Llm(#[from] LLMError),
}

#[async_trait]
pub trait PromptRefiner: Send + Sync {
    async fn refine(&self, prompt: &str) -> Result<String, RefineError>;
}

pub struct LlmPromptRefiner {
    llm: Arc<LLMProvider>,
}

impl LlmPromptRefiner {
    pub fn new(llm: Arc<LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PromptRefiner for LlmPromptRefiner {
    async fn refine(&self, prompt: &str) -> Result<String, RefineError> {
        let refined = self
            .llm
            .complete(&meta_prompt_for(prompt), ResponseFormat::Text)
            .await?;
        tracing::debug!(len = refined.len(), "prompt refined");
        Ok(refined)
    }
}

/// Returns the refined prompt, or the original when refinement fails or
/// does not finish within `budget`.
pub async fn refine_or_original(
    refiner: &dyn PromptRefiner,
    prompt: &str,
    budget: Duration,
) -> (String, bool) {
    match tokio::time::timeout(budget, refiner.refine(prompt)).await {
        Ok(Ok(refined)) => (refined, true),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "prompt refinement failed, using original prompt");
            (prompt.to_string(), false)
        }
        Err(_) => {
            tracing::warn!(?budget, "prompt refinement timed out, using original prompt");
            (prompt.to_string(), false)
        }
    }
}

fn meta_prompt_for(prompt: &str) -> String {
    META_PROMPT.replace("{prompt}", prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl PromptRefiner for Failing {
        async fn refine(&self, _prompt: &str) -> Result<String, RefineError> {
            Err(LLMError::EmptyChoices.into())
        }
    }

    struct Upper;

    struct Stalled;

    #[async_trait]
    impl PromptRefiner for Stalled {
        async fn refine(&self, prompt: &str) -> Result<String, RefineError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(prompt.to_uppercase())
        }
    }

    #[async_trait]
    impl PromptRefiner for Upper {
        async fn refine(&self, prompt: &str) -> Result<String, RefineError> {
            Ok(prompt.to_uppercase())
        }
    }

    #[test]
    fn test_meta_prompt_embeds_original() {
        let text = meta_prompt_for("Create 10 exercises");
        assert!(text.contains("---\nCreate 10 exercises\n---"));
        assert!(!text.contains("{prompt}"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let (prompt, refined) =
            refine_or_original(&Failing, "original", Duration::from_secs(1)).await;
        assert_eq!(prompt, "original");
        assert!(!refined);
    }

    #[tokio::test]
    async fn test_success_uses_refined() {
        let (prompt, refined) = refine_or_original(&Upper, "abc", Duration::from_secs(1)).await;
        assert_eq!(prompt, "ABC");
        assert!(refined);
    }

    #[tokio::test]
    async fn test_stalled_refinement_falls_back_after_budget() {
        let started = std::time::Instant::now();
        let (prompt, refined) =
            refine_or_original(&Stalled, "original", Duration::from_millis(50)).await;
        assert_eq!(prompt, "original");
        assert!(!refined);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
