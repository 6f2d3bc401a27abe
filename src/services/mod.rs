pub mod exercise_engine;
pub mod exercise_generator;
pub mod llm_provider;
pub mod prompt_refiner;
pub mod srs;
pub mod topics;

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a topic prompt; the cache key of its exercises.
pub fn prompt_hash(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_hash_is_sha256_hex() {
        assert_eq!(
            prompt_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_prompt_hash_changes_with_prompt() {
        assert_ne!(prompt_hash("Create exercises"), prompt_hash("Create exercises."));
    }
}
