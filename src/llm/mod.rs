//! Generative model service
//!
//! `GenerativeModel` is the seam between the pipeline and whatever produces
//! text; [`OllamaClient`] talks to a local Ollama server.

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generative service unavailable: {0}")]
    Unavailable(String),

    #[error("Generative service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response: {0}")]
    InvalidResponse(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generative service returned an empty response")]
    EmptyResponse,
}

/// Text generation backend
///
/// One call, no retries; callers decide the fallback on failure.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Run `generate` under a deadline, mapping expiry to [`GenerationError::Timeout`]
pub async fn generate_with_timeout(
    model: &dyn GenerativeModel,
    prompt: &str,
    system_instruction: &str,
    temperature: f32,
    timeout: Duration,
) -> Result<String, GenerationError> {
    match tokio::time::timeout(timeout, model.generate(prompt, system_instruction, temperature))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    }
}
