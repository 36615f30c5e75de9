// Deterministic providers shared by the integration tests
#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use company_brain::config::{Config, PathsConfig};
use company_brain::embeddings::Embedder;
use company_brain::llm::{ChatModel, ChatRequest};

pub const DIMENSION: usize = 64;
pub const MODEL: &str = "keyword-test";

/// Hashed bag of words, so texts sharing words are close together
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
    {
        let word = word.to_lowercase();
        let stem = word.strip_suffix('s').unwrap_or(&word);
        let mut hasher = DefaultHasher::new();
        stem.hash(&mut hasher);
        let bucket = usize::try_from(hasher.finish() % DIMENSION as u64).unwrap_or(0);
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    } else {
        vector[0] = 1.0;
    }
    vector
}

#[derive(Debug, Default)]
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        MODEL
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        MODEL
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

/// Which of the three prompts a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Rewrite,
    Expansion,
    Answer,
}

pub fn prompt_kind(prompt: &str) -> PromptKind {
    if prompt.contains("Search Query:") {
        PromptKind::Rewrite
    } else if prompt.contains("different versions") {
        PromptKind::Expansion
    } else {
        PromptKind::Answer
    }
}

type Responder = dyn Fn(PromptKind, &str) -> Result<String> + Send + Sync;

/// Chat model replying per prompt kind and recording what it was asked
pub struct RoutedChat {
    responder: Box<Responder>,
    pub asked: Mutex<Vec<PromptKind>>,
}

impl RoutedChat {
    pub fn new(responder: impl Fn(PromptKind, &str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self, kind: PromptKind) -> usize {
        self.asked
            .lock()
            .map_or(0, |asked| asked.iter().filter(|k| **k == kind).count())
    }
}

#[async_trait]
impl ChatModel for RoutedChat {
    fn model_name(&self) -> &str {
        "routed-test"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let prompt = request.prompt_text();
        let kind = prompt_kind(&prompt);
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(kind);
        }
        (self.responder)(kind, &prompt)
    }
}

/// Configuration reading from `root/docs` and writing the index to `root/index`
pub fn config_in(root: &Path) -> Config {
    let mut config = Config {
        paths: PathsConfig {
            source_dir: root.join("docs"),
            index_dir: Some(root.join("index")),
        },
        base_dir: root.to_path_buf(),
        ..Config::default()
    };
    config.ollama.embedding_model = MODEL.to_string();
    config.ollama.embedding_dimension = DIMENSION as u32;
    config
}

pub fn write_corpus(config: &Config, files: &[(&str, &str)]) {
    let dir = config.source_path();
    fs::create_dir_all(dir).expect("should create source dir");
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("should create parent dir");
        }
        fs::write(path, content).expect("should write document");
    }
}
