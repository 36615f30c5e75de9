
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use tracing::{debug, warn};

use super::{RetrievedChunk, SimilaritySearch};
use crate::RagError;
use crate::llm::{ChatModel, ChatRequest};

const EXPANSION_PROMPT: &str = "You are an AI language model assistant. Your task is to generate \
{count} different versions of the given user question to retrieve relevant documents from a \
vector database. By generating multiple perspectives on the user question, your goal is to help \
the user overcome some of the limitations of the distance-based similarity search. Provide these \
alternative questions separated by newlines.
Original question: {question}";

/// Produces alternative phrasings of a query
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str, count: usize) -> anyhow::Result<Vec<String>>;
}

/// Asks a chat model for paraphrases, one per line
pub struct LlmQueryExpander {
    model: Arc<dyn ChatModel>,
}

impl LlmQueryExpander {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryExpander for LlmQueryExpander {
    async fn expand(&self, query: &str, count: usize) -> anyhow::Result<Vec<String>> {
        let prompt = EXPANSION_PROMPT
            .replace("{count}", &count.to_string())
            .replace("{question}", query);
        let reply = self.model.complete(&ChatRequest::deterministic(prompt)).await?;
        Ok(parse_variants(&reply, query, count))
    }
}

/// Split a reply into distinct phrasings, dropping list markers, blanks and the original query
fn parse_variants(reply: &str, original: &str, count: usize) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case(original.trim()))
        .unique_by(|line| line.to_lowercase())
        .take(count)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix(|c: char| matches!(c, '-' | '*' | '•'))
        .unwrap_or(line)
        .trim_start();

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0
        && let Some(rest) = line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))
    {
        return rest.trim();
    }
    line
}

/// Outcome of retrieving context for one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    /// Every query searched, the original first
    pub queries: Vec<String>,
    /// Deduplicated chunks in first-seen order
    pub chunks: Vec<RetrievedChunk>,
    /// Paraphrasing failed and only the original query was searched
    pub expansion_failed: bool,
}

/// Searches the original query plus model-generated paraphrases and merges the results
pub struct MultiQueryRetriever {
    search: Arc<dyn SimilaritySearch>,
    expander: Arc<dyn QueryExpander>,
    top_k: usize,
    variants: usize,
}

impl MultiQueryRetriever {
    #[inline]
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        expander: Arc<dyn QueryExpander>,
        top_k: usize,
        variants: usize,
    ) -> Self {
        Self {
            search,
            expander,
            top_k,
            variants,
        }
    }

    /// Retrieve context for `query`.
    ///
    /// A failed expansion degrades to the original query alone; failed searches for
    /// paraphrases are ignored. Only a failed search for the original query is an error.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> crate::Result<Retrieval> {
        let (variants, expansion_failed) = match self.expander.expand(query, self.variants).await
        {
            Ok(variants) => (variants, false),
            Err(e) => {
                warn!("Query expansion failed, searching original query only: {:#}", e);
                (Vec::new(), true)
            }
        };

        let queries: Vec<String> = std::iter::once(query.to_string())
            .chain(variants)
            .collect();
        debug!("Searching {} queries: {:?}", queries.len(), queries);

        let searches = queries.iter().map(|q| self.search.search(q, self.top_k));
        let mut outcomes = join_all(searches).await.into_iter();

        let original = match outcomes.next() {
            Some(Ok(chunks)) => chunks,
            Some(Err(e)) => {
                return Err(RagError::Retrieval(format!(
                    "Search for the original query failed: {}",
                    e
                )));
            }
            None => Vec::new(),
        };

        let mut merged = original;
        for (variant, outcome) in queries.iter().skip(1).zip(outcomes) {
            match outcome {
                Ok(chunks) => merged.extend(chunks),
                Err(e) => warn!("Ignoring failed search for {:?}: {}", variant, e),
            }
        }

        let chunks: Vec<RetrievedChunk> = merged
            .into_iter()
            .unique_by(|chunk| chunk.dedup_key().to_string())
            .collect();
        debug!("Retrieved {} unique chunks", chunks.len());

        Ok(Retrieval {
            queries,
            chunks,
            expansion_failed,
        })
    }
}
