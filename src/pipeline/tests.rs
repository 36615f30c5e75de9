use std::path::PathBuf;

use async_trait::async_trait;

use super::*;
use crate::generation::DECLINE_ANSWER;
use crate::llm::ChatRequest;
use crate::test_support::{NoVariants, ScriptedChat, StaticSearch, routed_chat};

fn chunk(id: &str, content: &str) -> RetrievedChunk {
    RetrievedChunk {
        id: Some(id.to_string()),
        content: content.to_string(),
        source: PathBuf::from("/docs/handbook.txt"),
        page: None,
        chunk_index: 0,
        distance: 0.2,
    }
}

fn pipeline(chat: Arc<ScriptedChat>, search: StaticSearch) -> RagPipeline {
    let chat: Arc<dyn ChatModel> = chat;
    let retriever = MultiQueryRetriever::new(Arc::new(search), Arc::new(NoVariants), 5, 3);
    RagPipeline::new(
        QueryRewriter::new(Arc::clone(&chat)),
        retriever,
        AnswerGenerator::new(chat),
    )
}

#[test]
fn stage_names() {
    assert_eq!(PipelineStage::Rewriting.to_string(), "rewriting");
    assert_eq!(PipelineStage::Generating.to_string(), "generating");
    assert_eq!(PipelineStage::Failed.to_string(), "failed");
}

#[tokio::test]
async fn answer_records_every_stage_output() {
    let chat = Arc::new(routed_chat(
        Some("office Friday closed"),
        Some("The office is closed on Fridays."),
    ));
    let pipeline = pipeline(
        Arc::clone(&chat),
        StaticSearch(Some(vec![chunk("1", "Office closed on Fridays.")])),
    );

    let answer = pipeline
        .answer("Is the office open on Friday?")
        .await
        .expect("should answer");

    assert_eq!(answer.question, "Is the office open on Friday?");
    assert_eq!(answer.search_query, "office Friday closed");
    assert!(!answer.rewrite_fell_back);
    assert!(!answer.expansion_failed);
    assert_eq!(answer.queries, vec!["office Friday closed"]);
    assert_eq!(answer.context.len(), 1);
    assert_eq!(answer.text, "The office is closed on Fridays.");

    // The answer prompt carries the question as asked, not the rewrite
    let prompt = chat.last_prompt().expect("should have prompt");
    assert!(prompt.contains("Question:\nIs the office open on Friday?"));
}

#[tokio::test]
async fn failed_rewrite_falls_back_to_raw_question() {
    let chat = Arc::new(routed_chat(None, Some("Closed.")));
    let pipeline = pipeline(chat, StaticSearch(Some(vec![chunk("1", "Office closed.")])));

    let answer = pipeline.answer("Open Friday?").await.expect("should answer");

    assert!(answer.rewrite_fell_back);
    assert_eq!(answer.search_query, "Open Friday?");
    assert_eq!(answer.text, "Closed.");
}

#[tokio::test]
async fn failed_rewrite_is_terminal_when_configured() {
    let chat = Arc::new(routed_chat(None, Some("Closed.")));
    let pipeline = pipeline(chat, StaticSearch(Some(vec![chunk("1", "Office closed.")])))
        .with_rewrite_fallback(RewriteFallback::Fail);

    let error = pipeline.answer("Open Friday?").await.expect_err("should fail");

    assert_eq!(error.stage(), Some(PipelineStage::Rewriting));
    assert!(matches!(
        error,
        RagError::Stage { ref source, .. } if matches!(**source, RagError::Generation(_))
    ));
}

#[tokio::test]
async fn retrieval_failure_is_reported_with_its_stage() {
    let chat = Arc::new(routed_chat(Some("query"), Some("answer")));
    let pipeline = pipeline(chat, StaticSearch(None));

    let error = pipeline.answer("question").await.expect_err("should fail");
    assert_eq!(error.stage(), Some(PipelineStage::Retrieving));
    assert_eq!(error.user_message(), "Searching the knowledge base failed.");
}

#[tokio::test]
async fn generation_failure_is_reported_with_its_stage() {
    let chat = Arc::new(routed_chat(Some("query"), None));
    let pipeline = pipeline(chat, StaticSearch(Some(vec![chunk("1", "text")])));

    let error = pipeline.answer("question").await.expect_err("should fail");
    assert_eq!(error.stage(), Some(PipelineStage::Generating));
}

#[tokio::test]
async fn empty_context_declines() {
    let chat = Arc::new(routed_chat(Some("query"), Some("made up answer")));
    let pipeline = pipeline(Arc::clone(&chat), StaticSearch(Some(Vec::new())));

    let answer = pipeline.answer("question").await.expect("should answer");

    assert!(answer.context.is_empty());
    assert_eq!(answer.text, DECLINE_ANSWER);
    // Only the rewrite reached the model
    assert_eq!(chat.request_count(), 1);
}

struct SlowChat;

#[async_trait]
impl ChatModel for SlowChat {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: &ChatRequest) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("too late".to_string())
    }
}

#[tokio::test]
async fn slow_request_times_out() {
    let chat: Arc<dyn ChatModel> = Arc::new(SlowChat);
    let retriever = MultiQueryRetriever::new(
        Arc::new(StaticSearch(Some(Vec::new()))),
        Arc::new(NoVariants),
        5,
        3,
    );
    let pipeline = RagPipeline::new(
        QueryRewriter::new(Arc::clone(&chat)),
        retriever,
        AnswerGenerator::new(chat),
    )
    .with_request_timeout(Duration::from_millis(50));

    let error = pipeline.answer("question").await.expect_err("should time out");
    assert!(matches!(error, RagError::Timeout(after) if after == Duration::from_millis(50)));
    assert!(error.stage().is_none());
}
