// Deterministic providers for unit tests

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::RagError;
use crate::embeddings::Embedder;
use crate::llm::{ChatModel, ChatRequest};
use crate::retrieval::{QueryExpander, RetrievedChunk, SimilaritySearch};

pub const TEST_DIMENSION: usize = 64;

/// Bag-of-words embedder: texts sharing words end up close together
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; TEST_DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
    {
        let word = word.to_lowercase();
        let stem = word.strip_suffix('s').unwrap_or(&word);
        let mut hasher = DefaultHasher::new();
        stem.hash(&mut hasher);
        let bucket = usize::try_from(hasher.finish() % TEST_DIMENSION as u64).unwrap_or(0);
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    } else {
        vector[0] = 1.0;
    }
    vector
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Embedder whose provider is always down
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

type Responder = dyn Fn(&ChatRequest) -> Result<String> + Send + Sync;

/// Chat model answering through a closure and recording every request
pub struct ScriptedChat {
    responder: Box<Responder>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(responder: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(anyhow!("model unavailable")))
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map_or(0, |r| r.len())
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().map(ChatRequest::prompt_text))
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted-test"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.responder)(request)
    }
}

/// Returns the same chunks for every query, or fails every search when `None`
pub struct StaticSearch(pub Option<Vec<RetrievedChunk>>);

#[async_trait]
impl SimilaritySearch for StaticSearch {
    async fn search(&self, _query: &str, k: usize) -> crate::Result<Vec<RetrievedChunk>> {
        match &self.0 {
            Some(chunks) => Ok(chunks.iter().take(k).cloned().collect()),
            None => Err(RagError::Index("table disappeared".to_string())),
        }
    }
}

/// Expander that never finds alternative phrasings
pub struct NoVariants;

#[async_trait]
impl QueryExpander for NoVariants {
    async fn expand(&self, _query: &str, _count: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Chat model that answers rewrite prompts with `rewrite` and everything else with `answer`.
/// `None` makes that kind of call fail.
pub fn routed_chat(rewrite: Option<&'static str>, answer: Option<&'static str>) -> ScriptedChat {
    ScriptedChat::new(move |request: &ChatRequest| {
        let reply = if request.prompt_text().contains("Search Query:") {
            rewrite
        } else {
            answer
        };
        reply
            .map(str::to_string)
            .ok_or_else(|| anyhow!("model unavailable"))
    })
}
