
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::embeddings::OllamaClient;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ChatRole};

/// Chat completions through Ollama's `/api/chat` endpoint
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    client: OllamaClient,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    message: ChatMessage,
}

impl OllamaChatClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        Ok(Self::with_client(
            OllamaClient::new(config)?,
            config.chat_model.clone(),
        ))
    }

    /// Reuse an existing HTTP client, e.g. one with custom retry settings
    #[inline]
    pub fn with_client(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }

    /// Run one completion, blocking the calling thread
    #[inline]
    pub fn complete_blocking(&self, request: &ChatRequest) -> Result<String> {
        debug!(
            "Requesting completion from {} ({} messages, temperature {})",
            self.model,
            request.messages.len(),
            request.temperature
        );

        let body = ChatApiRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
            },
        };
        let request_json =
            serde_json::to_string(&body).context("Failed to serialize chat request")?;

        let response_text = self
            .client
            .post_json("/api/chat", &request_json)
            .context("Failed to get chat completion")?;

        let response: ChatApiResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        if response.message.role != ChatRole::Assistant {
            warn!(
                "Completion came back with role {:?} instead of assistant",
                response.message.role
            );
        }
        debug!(
            "Received completion of {} characters",
            response.message.content.len()
        );
        Ok(response.message.content)
    }
}

#[async_trait]
impl ChatModel for OllamaChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let client = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || client.complete_blocking(&request))
            .await
            .context("Chat task failed to complete")?
    }
}
