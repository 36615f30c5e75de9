// Answer generation grounded in retrieved context


use std::sync::Arc;

use tracing::{debug, info};

use crate::RagError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::retrieval::RetrievedChunk;

const ANSWER_INSTRUCTIONS: &str = "You are a helpful assistant for a company.
Use the following pieces of retrieved context to answer the question.
If you don't know the answer, just say that you don't know.
Use three sentences maximum and keep the answer concise.";

/// Returned without calling the model when nothing relevant was retrieved
pub const DECLINE_ANSWER: &str =
    "I don't know. I couldn't find anything about that in the company documents.";

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    decline_on_empty_context: bool,
}

impl AnswerGenerator {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            decline_on_empty_context: true,
        }
    }

    #[inline]
    pub fn with_decline_on_empty_context(mut self, decline: bool) -> Self {
        self.decline_on_empty_context = decline;
        self
    }

    /// Answer `question` from `context` with a single model call
    #[inline]
    pub async fn generate(
        &self,
        question: &str,
        context: &[RetrievedChunk],
    ) -> crate::Result<String> {
        if context.is_empty() && self.decline_on_empty_context {
            info!("No context retrieved, declining to answer");
            return Ok(DECLINE_ANSWER.to_string());
        }

        let request = build_request(question, context);
        debug!(
            "Generating answer from {} chunks ({} prompt chars)",
            context.len(),
            request.prompt_text().len()
        );

        let answer = self
            .model
            .complete(&request)
            .await
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        Ok(answer.trim().to_string())
    }
}

/// Instructions as the system message, context and question as the user message
#[inline]
pub fn build_request(question: &str, context: &[RetrievedChunk]) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(ANSWER_INSTRUCTIONS),
            ChatMessage::user(build_prompt(question, context)),
        ],
        temperature: 0.0,
    }
}

/// The user turn: context joined by blank lines, then the question.
///
/// Brace placeholders inside a chunk or the question are kept verbatim.
#[inline]
pub fn build_prompt(question: &str, context: &[RetrievedChunk]) -> String {
    let context = context
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Context:\n{context}\n\nQuestion:\n{question}\n\nAnswer:")
}
