use thiserror::Error;

use crate::db::operations::topics as topic_ops;
use crate::db::operations::{PromptVersion, Topic};
use crate::db::DatabaseProxy;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic not found: {0}")]
    NotFound(String),
    #[error("prompt version not found: {0}")]
    VersionNotFound(String),
    #[error("prompt version belongs to another topic")]
    VersionTopicMismatch,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for TopicError {
    fn from(err: sqlx::Error) -> Self {
        TopicError::Store(StoreError::Sqlx(err))
    }
}

pub async fn list_topics(proxy: &DatabaseProxy) -> Result<Vec<Topic>, TopicError> {
    Ok(topic_ops::list_topics(proxy).await?)
}

pub async fn get_topic(proxy: &DatabaseProxy, topic_id: &str) -> Result<Topic, TopicError> {
    topic_ops::get_topic(proxy, topic_id)
        .await?
        .ok_or_else(|| TopicError::NotFound(topic_id.to_string()))
}

pub async fn create_topic(
    proxy: &DatabaseProxy,
    name: &str,
    prompt: &str,
) -> Result<Topic, TopicError> {
    let name = name.trim();
    if name.is_empty() || prompt.trim().is_empty() {
        return Err(TopicError::Validation("Name and prompt are required".to_string()));
    }
    let topic = topic_ops::insert_topic(proxy, name, prompt).await?;
    tracing::info!(topic_id = %topic.id, name = %topic.name, "topic created");
    Ok(topic)
}

/// Replaces the prompt (and optionally the name) and records a new version.
pub async fn update_topic(
    proxy: &DatabaseProxy,
    topic_id: &str,
    name: Option<&str>,
    prompt: &str,
) -> Result<Topic, TopicError> {
    if prompt.trim().is_empty() {
        return Err(TopicError::Validation("Prompt is required".to_string()));
    }
    let current = get_topic(proxy, topic_id).await?;
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(current.name.as_str());

    let topic = topic_ops::update_topic(proxy, topic_id, name, prompt)
        .await?
        .ok_or_else(|| TopicError::NotFound(topic_id.to_string()))?;
    tracing::info!(topic_id, "topic prompt updated");
    Ok(topic)
}

pub async fn delete_topic(proxy: &DatabaseProxy, topic_id: &str) -> Result<(), TopicError> {
    if !topic_ops::delete_topic(proxy, topic_id).await? {
        return Err(TopicError::NotFound(topic_id.to_string()));
    }
    tracing::info!(topic_id, "topic deleted");
    Ok(())
}

pub async fn list_versions(
    proxy: &DatabaseProxy,
    topic_id: &str,
) -> Result<Vec<PromptVersion>, TopicError> {
    Ok(topic_ops::list_versions(proxy, topic_id).await?)
}

/// Makes an older prompt current again. The restore itself becomes a new version.
pub async fn restore_version(
    proxy: &DatabaseProxy,
    topic_id: &str,
    version_id: &str,
) -> Result<Topic, TopicError> {
    let version = topic_ops::get_version(proxy, version_id)
        .await?
        .ok_or_else(|| TopicError::VersionNotFound(version_id.to_string()))?;
    if version.topic_id != topic_id {
        return Err(TopicError::VersionTopicMismatch);
    }
    tracing::info!(topic_id, version = version.version, "restoring prompt version");
    update_topic(proxy, topic_id, None, &version.prompt).await
}

/// Creates the built-in topics on an empty database.
pub async fn seed_default_topics(proxy: &DatabaseProxy) -> Result<usize, TopicError> {
    let existing = topic_ops::count_topics(proxy).await?;
    if existing > 0 {
        tracing::debug!(existing, "topics present, skipping defaults");
        return Ok(0);
    }

    let mut created = 0;
    for (name, prompt) in DEFAULT_TOPICS {
        match create_topic(proxy, name, prompt).await {
            Ok(_) => created += 1,
            Err(err) => tracing::warn!(name, error = %err, "failed to create default topic"),
        }
    }
    tracing::info!(created, "default topics initialized");
    Ok(created)
}

const DEFAULT_TOPICS: [(&str, &str); 3] = [
    (
        "Conjunctions",
        r#"You are an expert German language tutor creating B1-level grammar exercises. Your task is to generate a JSON object containing unique sentences focused on German conjunctions.

Please adhere to the following rules:
1. **Sentence Structure:** Each sentence must correctly use a German conjunction. Include a mix of coordinating and subordinating conjunctions from the provided list.
2. **Vocabulary:** Use common B1-level vocabulary.
3. **Clarity:** The English hint must be a natural and accurate translation of the German sentence.
Conjunction List: weil, obwohl, damit, wenn, dass, als, bevor, nachdem, ob, seit, und, oder, aber, denn, sondern.

Return ONLY the JSON object, with no other text or explanations."#,
    ),
    (
        "Verb + Preposition",
        r#"You are an expert German language tutor creating B1-level exercises focused on German verbs with prepositions. Your task is to generate a JSON object containing unique sentences that practice verb-preposition combinations.

Please adhere to the following rules:
1. **Sentence Structure:** Each sentence must correctly use a German verb with its required preposition.
2. **Vocabulary:** Use common B1-level vocabulary.
3. **Clarity:** The English hint must be a natural and accurate translation of the German sentence.
Common verb-preposition combinations: denken an, warten auf, sich freuen über, sprechen über, bitten um, sich interessieren für, etc.

Return ONLY the JSON object, with no other text or explanations."#,
    ),
    (
        "Preterite vs Perfect",
        r#"You are an expert German language tutor creating B1-level exercises focused on the correct usage of Preterite (Präteritum) vs Perfect tense (Perfekt) in German. Your task is to generate a JSON object containing unique sentences that practice these tenses.

Please adhere to the following rules:
1. **Sentence Structure:** Each sentence must demonstrate the appropriate use of either Preterite or Perfect tense.
2. **Vocabulary:** Use common B1-level vocabulary.
3. **Clarity:** The English hint must be a natural and accurate translation of the German sentence.
Focus on: written vs spoken contexts, completed actions, narrative vs conversational style.

Return ONLY the JSON object, with no other text or explanations."#,
    ),
];
