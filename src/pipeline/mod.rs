// Online query path
// Rewrite -> retrieve -> generate, run as one request under a deadline

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::VectorIndex;
use crate::embeddings::Embedder;
use crate::generation::AnswerGenerator;
use crate::llm::ChatModel;
use crate::retrieval::{
    LlmQueryExpander, MultiQueryRetriever, QueryRewriter, RetrievedChunk, RewriteFallback,
    VectorRetriever,
};

/// Where a request is in the query path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Rewriting,
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Rewriting => "rewriting",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of answering one question
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question: String,
    /// Query actually sent to the retriever
    pub search_query: String,
    /// The rewrite failed and the raw question was searched instead
    pub rewrite_fell_back: bool,
    pub expansion_failed: bool,
    /// Every query searched, the search query first
    pub queries: Vec<String>,
    pub context: Vec<RetrievedChunk>,
    pub text: String,
}

pub struct RagPipeline {
    rewriter: QueryRewriter,
    retriever: MultiQueryRetriever,
    generator: AnswerGenerator,
    rewrite_fallback: RewriteFallback,
    request_timeout: Duration,
}

impl RagPipeline {
    #[inline]
    pub fn new(
        rewriter: QueryRewriter,
        retriever: MultiQueryRetriever,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            rewriter,
            retriever,
            generator,
            rewrite_fallback: RewriteFallback::default(),
            request_timeout: Duration::from_secs(120),
        }
    }

    #[inline]
    pub fn with_rewrite_fallback(mut self, fallback: RewriteFallback) -> Self {
        self.rewrite_fallback = fallback;
        self
    }

    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wire the vector retriever and LLM-backed stages from configuration
    #[inline]
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        index: Arc<VectorIndex>,
    ) -> Self {
        let search = Arc::new(VectorRetriever::new(embedder, index));
        let expander = Arc::new(LlmQueryExpander::new(Arc::clone(&chat)));
        let retriever = MultiQueryRetriever::new(
            search,
            expander,
            config.retrieval.top_k,
            config.retrieval.query_variants,
        );
        let generator = AnswerGenerator::new(Arc::clone(&chat))
            .with_decline_on_empty_context(config.retrieval.decline_on_empty_context);

        Self::new(QueryRewriter::new(chat), retriever, generator)
            .with_rewrite_fallback(config.retrieval.rewrite_fallback)
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// Stage failures are wrapped in [`RagError::Stage`]; running past the request
    /// deadline yields [`RagError::Timeout`].
    #[inline]
    pub async fn answer(&self, question: &str) -> crate::Result<Answer> {
        match tokio::time::timeout(self.request_timeout, self.run(question)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Request exceeded {:?}", self.request_timeout);
                Err(RagError::Timeout(self.request_timeout))
            }
        }
    }

    async fn run(&self, question: &str) -> crate::Result<Answer> {
        let mut stage = PipelineStage::Idle;
        let result = self.run_stages(question, &mut stage).await;

        match &result {
            Ok(_) => transition(&mut stage, PipelineStage::Done),
            Err(e) => {
                warn!("Request failed while {}: {}", stage, e);
                transition(&mut stage, PipelineStage::Failed);
            }
        }
        result
    }

    async fn run_stages(
        &self,
        question: &str,
        stage: &mut PipelineStage,
    ) -> crate::Result<Answer> {
        transition(stage, PipelineStage::Rewriting);
        let (search_query, rewrite_fell_back) = match self.rewriter.rewrite(question).await {
            Ok(query) => (query, false),
            Err(e) if self.rewrite_fallback == RewriteFallback::RawQuestion => {
                warn!("Query rewrite failed, searching the raw question: {}", e);
                (question.to_string(), true)
            }
            Err(e) => return Err(in_stage(*stage, e)),
        };

        transition(stage, PipelineStage::Retrieving);
        let retrieval = self
            .retriever
            .retrieve(&search_query)
            .await
            .map_err(|e| in_stage(*stage, e))?;

        transition(stage, PipelineStage::Generating);
        let text = self
            .generator
            .generate(question, &retrieval.chunks)
            .await
            .map_err(|e| in_stage(*stage, e))?;

        info!(
            "Answered from {} chunks over {} queries",
            retrieval.chunks.len(),
            retrieval.queries.len()
        );

        Ok(Answer {
            question: question.to_string(),
            search_query,
            rewrite_fell_back,
            expansion_failed: retrieval.expansion_failed,
            queries: retrieval.queries,
            context: retrieval.chunks,
            text,
        })
    }
}

fn transition(stage: &mut PipelineStage, next: PipelineStage) {
    debug!("Pipeline {} -> {}", stage, next);
    *stage = next;
}

fn in_stage(stage: PipelineStage, error: RagError) -> RagError {
    RagError::Stage {
        stage,
        source: Box::new(error),
    }
}
