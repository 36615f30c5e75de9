#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::debug;

use crate::RagError;
use crate::llm::{ChatModel, ChatRequest};

const REWRITE_PROMPT: &str = "Provide a better search query for the user question.
Focus on extracting keywords and intent.
Do not answer the question, just rewrite it for a search engine.

User Question: {question}

Search Query:";

/// Rewrites a raw question into a search-optimized query
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Ask the model for a search query at temperature 0.
    ///
    /// Fails with [`RagError::Generation`] when the model errors or replies with nothing usable.
    #[inline]
    pub async fn rewrite(&self, question: &str) -> crate::Result<String> {
        let request = ChatRequest::deterministic(REWRITE_PROMPT.replace("{question}", question));

        let raw = self
            .model
            .complete(&request)
            .await
            .map_err(|e| RagError::Generation(format!("Query rewrite failed: {:#}", e)))?;

        let query = clean_rewrite(&raw);
        if query.is_empty() {
            return Err(RagError::Generation(
                "Query rewrite returned an empty response".to_string(),
            ));
        }

        debug!("Rewrote {:?} as {:?}", question, query);
        Ok(query)
    }
}

/// Strip a leading "Search Query:" label and surrounding quotes
fn clean_rewrite(raw: &str) -> String {
    let mut text = raw.trim();

    let prefix_len = "search query:".len();
    if text.len() >= prefix_len
        && text.is_char_boundary(prefix_len)
        && text[..prefix_len].eq_ignore_ascii_case("search query:")
    {
        text = text[prefix_len..].trim_start();
    }

    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('`', '`')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            text = inner.trim();
            break;
        }
    }

    text.to_string()
}
