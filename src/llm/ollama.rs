//! Ollama chat client

use super::{GenerationError, GenerativeModel};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a local Ollama server
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    top_p: f32,
    num_predict: u32,
    num_ctx: u32,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client; `timeout` bounds every HTTP request
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            top_p: config.top_p,
            num_predict: config.num_predict,
            num_ctx: config.num_ctx,
            timeout,
        })
    }

    /// Names of the models installed on the server
    pub async fn available_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, body });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the server answers on `/api/tags`
    pub async fn is_available(&self) -> bool {
        self.available_models().await.is_ok()
    }

    /// Make sure the configured model is installed
    ///
    /// A configured name without a tag matches any tag of that model, so
    /// `llama3` accepts `llama3:8b` but not `llama3.1:8b`. When the model is
    /// missing, the first installed model is used instead.
    pub async fn resolve_model(&mut self) -> Result<String, GenerationError> {
        let models = self.available_models().await?;
        info!("Ollama reachable, models: {:?}", models);

        if models.iter().any(|m| model_matches(m, &self.model)) {
            return Ok(self.model.clone());
        }

        match models.into_iter().next() {
            Some(first) => {
                warn!(
                    "Model {} not installed, falling back to {}",
                    self.model, first
                );
                self.model = first;
                Ok(self.model.clone())
            }
            None => Err(GenerationError::Unavailable(
                "No models installed in Ollama".to_string(),
            )),
        }
    }
}

/// Whether an installed model tag satisfies the configured model name
fn model_matches(installed: &str, wanted: &str) -> bool {
    if wanted.contains(':') {
        return installed == wanted;
    }
    installed.split(':').next() == Some(wanted)
}

#[async_trait]
impl GenerativeModel for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if !system_instruction.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_instruction,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature,
                top_p: self.top_p,
                num_predict: self.num_predict,
                num_ctx: self.num_ctx,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} (model {}, {} prompt chars)", url, self.model, prompt.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = chat.message.content.trim().to_string();
        if content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
